use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::warn;

use super::types::{Result, TransformerConfig, TransformerError};

/// One client per process, shared by the token, retrieval and predictor calls.
pub fn build_client(config: &TransformerConfig) -> Result<Client> {
    if !config.verify_tls {
        warn!("TLS certificate verification is disabled for outbound calls");
    }

    let client = Client::builder()
        .danger_accept_invalid_certs(!config.verify_tls)
        .timeout(config.request_timeout)
        .build()?;

    Ok(client)
}

/// Reads the full body, failing on a non-success status before decoding.
pub async fn decode_json<T: DeserializeOwned>(
    response: Response,
    service: &'static str,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(TransformerError::Upstream {
            service,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|source| TransformerError::Decode { service, source })
}
