use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use super::types::{ENV_DOMAIN_VAR, LogFormat, LoggingArgs, PASSWORD_VAR, ServeArgs, USERNAME_VAR};
use crate::lib::transformer::types::{
    Credentials, Protocol, Result, TransformerConfig, TransformerError,
};

impl LoggingArgs {
    /// `RUST_LOG` wins over `--log-level` when set.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        match self.log_format {
            LogFormat::Json => fmt().json().with_env_filter(filter).init(),
            LogFormat::Pretty => fmt().with_env_filter(filter).init(),
        }
    }
}

fn required<F>(lookup: &F, field: &'static str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(field)
        .filter(|value| !value.trim().is_empty())
        .ok_or(TransformerError::MissingField { field })
}

impl Credentials {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Credentials {
            username: required(lookup, USERNAME_VAR)?,
            password: required(lookup, PASSWORD_VAR)?,
        })
    }
}

impl ServeArgs {
    /// Merges command-line flags with environment-supplied settings.
    pub fn into_config<F>(self, lookup: &F) -> Result<TransformerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.predictor_host.trim().is_empty() {
            return Err(TransformerError::InvalidConfig {
                field: "predictor_host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(TransformerError::InvalidConfig {
                field: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        let protocol: Protocol = self.protocol.parse()?;

        // The derived URLs need the domain; explicit overrides do not.
        let env_domain = match (&self.token_url, &self.retrieval_url) {
            (Some(_), Some(_)) => lookup(ENV_DOMAIN_VAR).unwrap_or_default(),
            _ => required(lookup, ENV_DOMAIN_VAR)?,
        };

        Ok(TransformerConfig {
            model_name: self.model_name,
            predictor_host: self.predictor_host,
            protocol,
            use_ssl: self.use_ssl,
            vectorstore_name: self.vectorstore_name,
            env_domain,
            credentials: Credentials::from_lookup(lookup)?,
            namespace_file: self.namespace_file,
            realm: self.realm,
            client_id: self.client_id,
            verify_tls: self.verify_tls,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            token_url: self.token_url,
            retrieval_url: self.retrieval_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use clap::{CommandFactory, Parser};

    use super::*;
    use crate::lib::config::types::{Cli, Command};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn serve_args(args: &[&str]) -> ServeArgs {
        let argv = ["qa-transformer", "serve"].into_iter().chain(args.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Serve(args) => args,
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn predictor_host_is_required() {
        assert!(Cli::try_parse_from(["qa-transformer", "serve"]).is_err());
    }

    #[test]
    fn underscore_flags_are_accepted() {
        let args = serve_args(&["--predictor_host", "llm:80", "--model_name", "qa", "--use_ssl"]);
        assert_eq!(args.predictor_host, "llm:80");
        assert_eq!(args.model_name, "qa");
        assert!(args.use_ssl);
        assert_eq!(args.protocol, "v1");
    }

    #[test]
    fn config_is_built_from_flags_and_env() {
        let lookup = env(&[
            ("EZAF_ENV", "ezaf.test"),
            ("USERNAME", "alice"),
            ("PASSWORD", "s3cret"),
        ]);
        let config = serve_args(&["--predictor-host", "llm:80", "--protocol", "V2"])
            .into_config(&lookup)
            .unwrap();

        assert_eq!(config.protocol, Protocol::V2);
        assert_eq!(config.env_domain, "ezaf.test");
        assert_eq!(config.credentials.username, "alice");
        assert_eq!(config.vectorstore_name, "vectorstore");
        assert_eq!(config.realm, "UA");
        assert_eq!(config.client_id, "ua-grant");
        assert!(!config.verify_tls);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(!format!("{:?}", config.credentials).contains("s3cret"));
    }

    #[test]
    fn missing_environment_is_reported() {
        let lookup = env(&[("USERNAME", "alice"), ("PASSWORD", "s3cret")]);
        let err = serve_args(&["--predictor-host", "llm:80"])
            .into_config(&lookup)
            .unwrap_err();
        assert!(matches!(err, TransformerError::MissingField { field: "EZAF_ENV" }));

        let lookup = env(&[("EZAF_ENV", "ezaf.test"), ("USERNAME", "alice"), ("PASSWORD", " ")]);
        let err = serve_args(&["--predictor-host", "llm:80"])
            .into_config(&lookup)
            .unwrap_err();
        assert!(matches!(err, TransformerError::MissingField { field: "PASSWORD" }));
    }

    #[test]
    fn explicit_urls_do_not_need_a_domain() {
        let lookup = env(&[("USERNAME", "alice"), ("PASSWORD", "s3cret")]);
        let config = serve_args(&[
            "--predictor-host",
            "llm:80",
            "--token-url",
            "http://auth/token",
            "--retrieval-url",
            "http://vs/predict",
        ])
        .into_config(&lookup)
        .unwrap();

        assert_eq!(config.env_domain, "");
        assert_eq!(config.token_url.as_deref(), Some("http://auth/token"));
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let lookup = env(&[
            ("EZAF_ENV", "ezaf.test"),
            ("USERNAME", "alice"),
            ("PASSWORD", "s3cret"),
        ]);
        let err = serve_args(&["--predictor-host", "llm:80", "--protocol", "grpc"])
            .into_config(&lookup)
            .unwrap_err();
        assert!(matches!(err, TransformerError::InvalidConfig { field: "protocol", .. }));
    }
}
