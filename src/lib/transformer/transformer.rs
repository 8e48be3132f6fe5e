use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::{
    auth::TokenProvider,
    client::{build_client, decode_json},
    types::{
        Instance, Model, PredictRequest, Protocol, Result, RetrievalResponse, TransformerConfig,
        TransformerError,
    },
};

/// Enriches each question with retrieved context before handing it to the
/// predictor.
pub struct Transformer {
    name: String,
    namespace: String,
    predictor_url: String,
    retrieval_url: String,
    client: Client,
    auth: TokenProvider,
}

/// Reads the namespace the service account was placed in.
pub fn read_namespace(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|source| TransformerError::Identity {
        path: path.to_path_buf(),
        source,
    })?;

    let namespace = raw.trim();
    if namespace.is_empty() {
        return Err(TransformerError::EmptyIdentity(path.to_path_buf()));
    }

    Ok(namespace.to_string())
}

pub fn retrieval_url(vectorstore: &str, namespace: &str, env_domain: &str) -> String {
    format!(
        "https://{vectorstore}-predictor-default.{namespace}.{env_domain}.com/v1/models/{vectorstore}:predict"
    )
}

pub fn token_url(env_domain: &str, realm: &str) -> String {
    format!("https://keycloak.{env_domain}.com/realms/{realm}/protocol/openid-connect/token")
}

pub fn predictor_url(protocol: Protocol, use_ssl: bool, host: &str, model: &str) -> String {
    let scheme = if use_ssl { "https" } else { "http" };
    match protocol {
        Protocol::V1 => format!("{scheme}://{host}/v1/models/{model}:predict"),
        Protocol::V2 => format!("{scheme}://{host}/v2/models/{model}/infer"),
    }
}

/// The question carried by the first instance.
pub fn first_question(request: &PredictRequest) -> Result<&str> {
    let instance = request
        .instances
        .first()
        .ok_or(TransformerError::NoInstances)?;

    instance
        .question
        .as_deref()
        .ok_or(TransformerError::MissingQuestion)
}

impl PredictRequest {
    pub fn from_question(question: &str) -> Self {
        PredictRequest {
            instances: vec![Instance {
                context: None,
                question: Some(question.to_string()),
            }],
        }
    }

    pub fn with_context(question: &str, context: String) -> Self {
        PredictRequest {
            instances: vec![Instance {
                context: Some(context),
                question: Some(question.to_string()),
            }],
        }
    }
}

impl Transformer {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn retrieval_url(&self) -> &str {
        &self.retrieval_url
    }

    pub fn predictor_url(&self) -> &str {
        &self.predictor_url
    }

    pub fn token_exchanges(&self) -> u64 {
        self.auth.exchanges()
    }
}

#[async_trait]
impl Model for Transformer {
    type Config = TransformerConfig;

    async fn initialize(config: TransformerConfig) -> Result<Self> {
        let namespace = read_namespace(&config.namespace_file)?;
        info!(%namespace, "resolved service namespace");

        let retrieval = config.retrieval_url.clone().unwrap_or_else(|| {
            retrieval_url(&config.vectorstore_name, &namespace, &config.env_domain)
        });
        let token_endpoint = config
            .token_url
            .clone()
            .unwrap_or_else(|| token_url(&config.env_domain, &config.realm));
        let predictor = predictor_url(
            config.protocol,
            config.use_ssl,
            &config.predictor_host,
            &config.model_name,
        );

        let client = build_client(&config)?;
        let auth = TokenProvider::new(
            client.clone(),
            &token_endpoint,
            &config.client_id,
            config.credentials.clone(),
        );

        // Fail startup if the credentials are rejected.
        auth.bearer().await?;

        Ok(Transformer {
            name: config.model_name,
            namespace,
            predictor_url: predictor,
            retrieval_url: retrieval,
            client,
            auth,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Construction only succeeds once a token is in hand, so a built
    /// transformer is always ready.
    fn is_ready(&self) -> bool {
        true
    }

    async fn preprocess(&self, request: PredictRequest) -> Result<PredictRequest> {
        let question = first_question(&request)?;
        info!(%question, "received question");

        let token = self.auth.bearer().await?;

        info!(url = %self.retrieval_url, "requesting relevant documents");
        let response = self
            .client
            .post(&self.retrieval_url)
            .bearer_auth(&token)
            .json(&PredictRequest::from_question(question))
            .send()
            .await?;

        let documents: RetrievalResponse = decode_json(response, "retrieval service").await?;
        let context = documents.predictions.join("\n");
        debug!(
            documents = documents.predictions.len(),
            %context,
            "received documents"
        );

        Ok(PredictRequest::with_context(question, context))
    }

    async fn predict(&self, request: PredictRequest) -> Result<Value> {
        let token = self.auth.bearer().await?;

        debug!(url = %self.predictor_url, "forwarding to predictor");
        let response = self
            .client
            .post(&self.predictor_url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await?;

        decode_json(response, "predictor").await
    }
}
