use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    client::decode_json,
    types::{BearerToken, Credentials, Result, TOKEN_REFRESH_SKEW, TokenResponse},
};

impl BearerToken {
    /// A lifetime too long to represent as an `Instant` is treated as no expiry.
    pub fn from_response(response: TokenResponse, issued_at: Instant) -> Self {
        BearerToken {
            value: response.access_token,
            expires_at: response
                .expires_in
                .and_then(|secs| issued_at.checked_add(Duration::from_secs(secs))),
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(at) => now + TOKEN_REFRESH_SKEW < at,
            None => true,
        }
    }
}

/// Password-grant token source with a single cached token.
///
/// The lock is held across a refresh so concurrent callers wait for one
/// exchange instead of racing to issue their own.
pub struct TokenProvider {
    client: Client,
    token_url: String,
    client_id: String,
    credentials: Credentials,
    token: Mutex<Option<BearerToken>>,
    exchanges: AtomicU64,
}

impl TokenProvider {
    pub fn new(client: Client, token_url: &str, client_id: &str, credentials: Credentials) -> Self {
        TokenProvider {
            client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            credentials,
            token: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Number of token exchanges performed so far.
    pub fn exchanges(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    pub async fn bearer(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
            debug!("bearer token near expiry, refreshing");
        }

        let token = self.exchange().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange(&self) -> Result<BearerToken> {
        let form = [
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.as_str()),
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
        ];

        let issued_at = Instant::now();
        let response = self.client.post(&self.token_url).form(&form).send().await?;
        let parsed: TokenResponse = decode_json(response, "token endpoint").await?;

        self.exchanges.fetch_add(1, Ordering::Relaxed);
        info!(
            url = %self.token_url,
            expires_in = ?parsed.expires_in,
            token_type = ?parsed.token_type,
            "obtained bearer token"
        );

        Ok(BearerToken::from_response(parsed, issued_at))
    }
}
