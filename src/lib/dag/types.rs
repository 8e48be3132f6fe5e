use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Arguments every task in the graph inherits unless it overrides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultArgs {
    pub owner: String,
    pub depends_on_past: bool,
    pub start_date: DateTime<Utc>,
    pub email: Vec<String>,
    pub email_on_failure: bool,
    pub email_on_retry: bool,
    pub max_active_runs: u32,
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    CanRead,
    CanEdit,
    CanDelete,
}

/// A task graph handed to the external scheduler. It does no work itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    pub dag_id: String,
    pub default_args: DefaultArgs,
    /// `None` means the graph only runs when triggered manually.
    pub schedule_interval: Option<String>,
    pub tags: Vec<String>,
    pub access_control: BTreeMap<String, BTreeSet<Permission>>,
    pub tasks: Vec<PodTask>,
}

/// One node of the graph: a pod running a single container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTask {
    pub task_id: String,
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub cmds: Vec<String>,
    pub arguments: Vec<String>,
    pub is_delete_operator_pod: bool,
    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,
}

// Volume and mount descriptors keep the cluster's own field names.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub persistent_volume_claim: PersistentVolumeClaimSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSource {
    pub claim_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Error, Debug)]
pub enum DagError {
    #[error("task {0} is already declared")]
    DuplicateTask(String),

    #[error("task {task_id} mounts undeclared volume {volume}")]
    UnknownVolume { task_id: String, volume: String },

    #[error("task {task_id} declares volume {volume} twice")]
    DuplicateVolume { task_id: String, volume: String },

    #[error("task {0} has no container image")]
    MissingImage(String),

    #[error("failed to encode task graph: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DagResult<T> = Result<T, DagError>;
