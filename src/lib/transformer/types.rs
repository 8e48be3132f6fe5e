use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
pub const DEFAULT_VECTORSTORE_NAME: &str = "vectorstore";
pub const DEFAULT_REALM: &str = "UA";
pub const DEFAULT_CLIENT_ID: &str = "ua-grant";

/// Tokens this close to expiry are refreshed before use.
pub const TOKEN_REFRESH_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    V1,
    V2,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub model_name: String,
    pub predictor_host: String,
    pub protocol: Protocol,
    pub use_ssl: bool,
    pub vectorstore_name: String,
    /// Deployment domain suffix, e.g. `ezaf.example`.
    pub env_domain: String,
    pub credentials: Credentials,
    pub namespace_file: PathBuf,
    pub realm: String,
    pub client_id: String,
    pub verify_tls: bool,
    pub request_timeout: Duration,
    pub token_url: Option<String>,
    pub retrieval_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
pub struct RetrievalResponse {
    pub predictions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Clone)]
pub struct BearerToken {
    pub value: String,
    /// `None` when the issuer gave no lifetime; such tokens never expire here.
    pub expires_at: Option<Instant>,
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What a hosted model exposes to the serving layer.
#[async_trait]
pub trait Model: Send + Sync {
    type Config: Send;

    async fn initialize(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    fn name(&self) -> &str;

    fn is_ready(&self) -> bool;

    async fn preprocess(&self, request: PredictRequest) -> Result<PredictRequest>;

    async fn predict(&self, request: PredictRequest) -> Result<Value>;

    async fn postprocess(&self, response: Value) -> Result<Value> {
        Ok(response)
    }
}

#[derive(Error, Debug)]
pub enum TransformerError {
    #[error("failed to read identity file {}: {source}", .path.display())]
    Identity {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("identity file {} is empty", .0.display())]
    EmptyIdentity(PathBuf),

    #[error("missing required setting: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed response from {service}: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("request has no instances")]
    NoInstances,

    #[error("instance is missing the `question` field")]
    MissingQuestion,

    #[error("model {0} not found")]
    ModelNotFound(String),

    #[error("model {0} is not ready")]
    NotReady(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransformerError>;

impl FromStr for Protocol {
    type Err = TransformerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" => Ok(Protocol::V1),
            "v2" => Ok(Protocol::V2),
            other => Err(TransformerError::InvalidConfig {
                field: "protocol",
                reason: format!("expected v1 or v2, got {other:?}"),
            }),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::V1 => write!(f, "v1"),
            Protocol::V2 => write!(f, "v2"),
        }
    }
}
