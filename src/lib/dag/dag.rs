use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tracing::debug;

use super::types::{
    Dag, DagError, DagResult, DefaultArgs, PersistentVolumeClaimSource, Permission, PodTask,
    Volume, VolumeMount,
};

impl DefaultArgs {
    pub fn new(owner: &str, start_date: DateTime<Utc>) -> Self {
        DefaultArgs {
            owner: owner.to_string(),
            depends_on_past: false,
            start_date,
            email: Vec::new(),
            email_on_failure: false,
            email_on_retry: false,
            max_active_runs: 1,
            retries: 0,
        }
    }
}

impl Dag {
    pub fn new(dag_id: &str, default_args: DefaultArgs) -> Self {
        Dag {
            dag_id: dag_id.to_string(),
            default_args,
            schedule_interval: None,
            tags: Vec::new(),
            access_control: Default::default(),
            tasks: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn grant(mut self, role: &str, permissions: &[Permission]) -> Self {
        self.access_control
            .entry(role.to_string())
            .or_default()
            .extend(permissions.iter().copied());
        self
    }

    pub fn add_task(&mut self, task: PodTask) -> DagResult<()> {
        task.validate()?;

        if self.tasks.iter().any(|t| t.task_id == task.task_id) {
            return Err(DagError::DuplicateTask(task.task_id));
        }

        debug!(dag_id = %self.dag_id, task_id = %task.task_id, "task added");
        self.tasks.push(task);
        Ok(())
    }

    pub fn to_json(&self) -> DagResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes a graph and re-checks every task, since the input may not have
    /// come from [`Dag::add_task`].
    pub fn from_json(raw: &str) -> DagResult<Self> {
        let dag: Dag = serde_json::from_str(raw)?;

        let mut seen = HashSet::new();
        for task in &dag.tasks {
            task.validate()?;
            if !seen.insert(task.task_id.as_str()) {
                return Err(DagError::DuplicateTask(task.task_id.clone()));
            }
        }

        Ok(dag)
    }
}

impl PodTask {
    pub fn new(task_id: &str, name: &str, image: &str) -> Self {
        PodTask {
            task_id: task_id.to_string(),
            name: name.to_string(),
            namespace: "default".to_string(),
            image: image.to_string(),
            cmds: Vec::new(),
            arguments: Vec::new(),
            is_delete_operator_pod: true,
            volumes: Vec::new(),
            volume_mounts: Vec::new(),
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_command(mut self, cmds: &[&str], arguments: &[&str]) -> Self {
        self.cmds = cmds.iter().map(|c| c.to_string()).collect();
        self.arguments = arguments.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn keep_pod(mut self) -> Self {
        self.is_delete_operator_pod = false;
        self
    }

    pub fn with_claim_mount(
        mut self,
        volume: &str,
        claim_name: &str,
        mount_path: &str,
        read_only: bool,
    ) -> Self {
        self.volumes.push(Volume::from_claim(volume, claim_name));
        self.volume_mounts.push(VolumeMount {
            name: volume.to_string(),
            mount_path: mount_path.to_string(),
            read_only,
        });
        self
    }

    pub fn validate(&self) -> DagResult<()> {
        if self.image.trim().is_empty() {
            return Err(DagError::MissingImage(self.task_id.clone()));
        }

        let mut declared = BTreeSet::new();
        for volume in &self.volumes {
            if !declared.insert(volume.name.as_str()) {
                return Err(DagError::DuplicateVolume {
                    task_id: self.task_id.clone(),
                    volume: volume.name.clone(),
                });
            }
        }

        if let Some(mount) = self
            .volume_mounts
            .iter()
            .find(|m| !declared.contains(m.name.as_str()))
        {
            return Err(DagError::UnknownVolume {
                task_id: self.task_id.clone(),
                volume: mount.name.clone(),
            });
        }

        Ok(())
    }
}

impl Volume {
    pub fn from_claim(name: &str, claim_name: &str) -> Self {
        Volume {
            name: name.to_string(),
            persistent_volume_claim: PersistentVolumeClaimSource {
                claim_name: claim_name.to_string(),
            },
        }
    }
}

/// Midnight (UTC) `days` days before `now`.
pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    (now - TimeDelta::days(days))
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// The shipped example: one manually triggered pod that echoes a line with a
/// claim mounted read-only.
pub fn example_kubernetes_operator(now: DateTime<Utc>) -> DagResult<Dag> {
    let mut default_args = DefaultArgs::new("airflow", days_ago(now, 1));
    default_args.email = vec!["airflow@example.com".to_string()];

    let mut dag = Dag::new("example_kubernetes_operator", default_args)
        .with_tag("example")
        .grant(
            "All",
            &[
                Permission::CanRead,
                Permission::CanEdit,
                Permission::CanDelete,
            ],
        );

    let task = PodTask::new("task", "airflow-test-pod", "ubuntu:latest")
        .in_namespace("mlflow")
        .with_command(&["bash", "-cx"], &["echo hello here"])
        .keep_pod()
        .with_claim_mount("test-volume", "mlflow-pvc", "/mnt/test", true);

    dag.add_task(task)?;
    Ok(dag)
}
