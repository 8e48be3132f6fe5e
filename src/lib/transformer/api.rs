use std::{future::Future, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span, warn};

use super::types::{Model, PredictRequest, Result, TransformerError};

impl IntoResponse for TransformerError {
    fn into_response(self) -> Response {
        let status = match &self {
            TransformerError::NoInstances
            | TransformerError::MissingQuestion
            | TransformerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TransformerError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            TransformerError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            TransformerError::Http(_)
            | TransformerError::Upstream { .. }
            | TransformerError::Decode { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Predict,
    Preprocess,
}

impl Verb {
    fn parse(verb: &str) -> Option<Self> {
        match verb {
            "predict" => Some(Verb::Predict),
            "preprocess" => Some(Verb::Preprocess),
            _ => None,
        }
    }
}

/// HTTP front for a single hosted model.
pub struct ModelServer<M: Model> {
    pub model: Arc<M>,
    pub address: String,
    pub port: u16,
}

impl<M: Model + 'static> ModelServer<M> {
    pub fn new(model: Arc<M>, address: &str, port: u16) -> Self {
        Self {
            model,
            address: address.to_string(),
            port,
        }
    }

    pub fn router(model: Arc<M>) -> Router {
        Router::new()
            .route("/", get(Self::liveness))
            .route("/v1/models", get(Self::list_models))
            .route(
                "/v1/models/{target}",
                get(Self::model_status).post(Self::model_action),
            )
            .with_state(model)
    }

    async fn liveness() -> Json<Value> {
        Json(json!({ "status": "alive" }))
    }

    async fn list_models(AxumState(model): AxumState<Arc<M>>) -> Json<Value> {
        Json(json!({ "models": [model.name()] }))
    }

    async fn model_status(
        AxumState(model): AxumState<Arc<M>>,
        Path(name): Path<String>,
    ) -> Result<Json<Value>> {
        if name != model.name() {
            return Err(TransformerError::ModelNotFound(name));
        }
        Ok(Json(json!({ "name": name, "ready": model.is_ready() })))
    }

    /// Handles `{name}:predict` and `{name}:preprocess`.
    async fn model_action(
        AxumState(model): AxumState<Arc<M>>,
        Path(target): Path<String>,
        body: Bytes,
    ) -> Result<Json<Value>> {
        let (name, verb) = target
            .split_once(':')
            .ok_or_else(|| TransformerError::ModelNotFound(target.clone()))?;

        if name != model.name() {
            return Err(TransformerError::ModelNotFound(name.to_string()));
        }
        let action =
            Verb::parse(verb).ok_or_else(|| TransformerError::ModelNotFound(target.clone()))?;
        if !model.is_ready() {
            return Err(TransformerError::NotReady(name.to_string()));
        }

        let request: PredictRequest = serde_json::from_slice(&body)
            .map_err(|e| TransformerError::InvalidInput(e.to_string()))?;

        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("inference", %request_id, model = %name, %verb);

        async move {
            match action {
                Verb::Predict => {
                    let enriched = model.preprocess(request).await?;
                    let response = model.predict(enriched).await?;
                    let response = model.postprocess(response).await?;
                    info!("prediction complete");
                    Ok(Json(response))
                }
                Verb::Preprocess => {
                    let enriched = model.preprocess(request).await?;
                    let value = serde_json::to_value(enriched).map_err(TransformerError::Encode)?;
                    Ok(Json(value))
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn start_server<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(format!("{}:{}", self.address, self.port)).await?;
        info!(
            address = %self.address,
            port = self.port,
            model = %self.model.name(),
            "model server listening"
        );

        Self::serve(listener, self.model, shutdown).await
    }

    pub async fn serve<F>(listener: TcpListener, model: Arc<M>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, Self::router(model))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
