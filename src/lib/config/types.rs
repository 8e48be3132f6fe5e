use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::lib::transformer::types::{
    DEFAULT_CLIENT_ID, DEFAULT_NAMESPACE_FILE, DEFAULT_REALM, DEFAULT_VECTORSTORE_NAME,
};

pub const ENV_DOMAIN_VAR: &str = "EZAF_ENV";
pub const USERNAME_VAR: &str = "USERNAME";
pub const PASSWORD_VAR: &str = "PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "qa-transformer", version, about = "Question-answering request transformer")]
pub struct Cli {
    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the transformer in front of a predictor.
    Serve(ServeArgs),
    /// Print the example pod-task graph in scheduler intake format.
    Dag(DagArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Host (and port) of the downstream predictor.
    #[arg(long, alias = "predictor_host")]
    pub predictor_host: String,

    #[arg(long, default_value = "v1")]
    pub protocol: String,

    /// Name the model is served under.
    #[arg(long, alias = "model_name", default_value = "model")]
    pub model_name: String,

    /// Use TLS when calling the predictor.
    #[arg(long, alias = "use_ssl")]
    pub use_ssl: bool,

    #[arg(long, default_value = "0.0.0.0")]
    pub http_address: String,

    #[arg(long, alias = "http_port", default_value_t = 8080)]
    pub http_port: u16,

    #[arg(long, default_value = DEFAULT_VECTORSTORE_NAME)]
    pub vectorstore_name: String,

    #[arg(long, default_value = DEFAULT_NAMESPACE_FILE)]
    pub namespace_file: PathBuf,

    #[arg(long, default_value = DEFAULT_REALM)]
    pub realm: String,

    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,

    /// Verify TLS certificates on outbound calls.
    #[arg(long)]
    pub verify_tls: bool,

    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Use this token endpoint instead of the one derived from the environment.
    #[arg(long)]
    pub token_url: Option<String>,

    /// Use this retrieval endpoint instead of the one derived from the namespace.
    #[arg(long)]
    pub retrieval_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct DagArgs {
    /// Emit single-line JSON.
    #[arg(long)]
    pub compact: bool,
}

#[derive(Debug, Args)]
pub struct LoggingArgs {
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}
