//! Local stand-ins for the token endpoint, retrieval service and predictor.

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use super::types::{Credentials, Protocol, TransformerConfig};

pub struct UpstreamBehavior {
    pub token_status: StatusCode,
    pub expires_in: Option<u64>,
    pub retrieval_status: StatusCode,
    pub retrieval_body: String,
    pub retrieval_delay: Option<Duration>,
}

impl Default for UpstreamBehavior {
    fn default() -> Self {
        UpstreamBehavior {
            token_status: StatusCode::OK,
            expires_in: Some(3600),
            retrieval_status: StatusCode::OK,
            retrieval_body: json!({ "predictions": ["doc one text", "doc two text"] })
                .to_string(),
            retrieval_delay: None,
        }
    }
}

impl UpstreamBehavior {
    pub fn with_predictions(predictions: &[&str]) -> Self {
        UpstreamBehavior {
            retrieval_body: json!({ "predictions": predictions }).to_string(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct Recorded {
    pub token_requests: AtomicUsize,
    pub retrieval_requests: AtomicUsize,
    pub predictor_requests: AtomicUsize,
    pub token_form: Mutex<Option<HashMap<String, String>>>,
    pub retrieval_body: Mutex<Option<Value>>,
    pub retrieval_auth: Mutex<Option<String>>,
    pub predictor_body: Mutex<Option<Value>>,
    pub predictor_auth: Mutex<Option<String>>,
}

struct Shared {
    behavior: UpstreamBehavior,
    recorded: Arc<Recorded>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub recorded: Arc<Recorded>,
}

impl MockUpstream {
    pub async fn start(behavior: UpstreamBehavior) -> Self {
        let recorded = Arc::new(Recorded::default());
        let shared = Arc::new(Shared {
            behavior,
            recorded: recorded.clone(),
        });

        let app = Router::new()
            .route("/token", post(token))
            .route("/retrieve", post(retrieve))
            .route("/v1/models/{target}", post(predictor))
            .with_state(shared);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockUpstream { addr, recorded }
    }

    pub fn token_requests(&self) -> usize {
        self.recorded.token_requests.load(Ordering::SeqCst)
    }

    pub fn retrieval_requests(&self) -> usize {
        self.recorded.retrieval_requests.load(Ordering::SeqCst)
    }

    pub fn predictor_requests(&self) -> usize {
        self.recorded.predictor_requests.load(Ordering::SeqCst)
    }

    pub fn config(&self, namespace_file: &Path) -> TransformerConfig {
        TransformerConfig {
            model_name: "qa".to_string(),
            predictor_host: self.addr.to_string(),
            protocol: Protocol::V1,
            use_ssl: false,
            vectorstore_name: "vectorstore".to_string(),
            env_domain: "ezaf.test".to_string(),
            credentials: Credentials {
                username: "alice".to_string(),
                password: "s3cret".to_string(),
            },
            namespace_file: namespace_file.to_path_buf(),
            realm: "UA".to_string(),
            client_id: "ua-grant".to_string(),
            verify_tls: true,
            request_timeout: Duration::from_secs(5),
            token_url: Some(format!("http://{}/token", self.addr)),
            retrieval_url: Some(format!("http://{}/retrieve", self.addr)),
        }
    }
}

pub fn namespace_file(contents: &str) -> tempfile::NamedTempFile {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn token(
    State(shared): State<Arc<Shared>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let n = shared.recorded.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    *shared.recorded.token_form.lock().unwrap() = Some(form);

    if !shared.behavior.token_status.is_success() {
        return (
            shared.behavior.token_status,
            Json(json!({ "error": "invalid_grant" })),
        );
    }

    let mut body = json!({ "access_token": format!("token-{n}"), "token_type": "Bearer" });
    if let Some(secs) = shared.behavior.expires_in {
        body["expires_in"] = json!(secs);
    }
    (StatusCode::OK, Json(body))
}

async fn retrieve(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    shared
        .recorded
        .retrieval_requests
        .fetch_add(1, Ordering::SeqCst);
    *shared.recorded.retrieval_body.lock().unwrap() = Some(body);
    *shared.recorded.retrieval_auth.lock().unwrap() = authorization(&headers);

    if let Some(delay) = shared.behavior.retrieval_delay {
        tokio::time::sleep(delay).await;
    }

    (
        shared.behavior.retrieval_status,
        [(header::CONTENT_TYPE, "application/json")],
        shared.behavior.retrieval_body.clone(),
    )
}

async fn predictor(
    State(shared): State<Arc<Shared>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    shared
        .recorded
        .predictor_requests
        .fetch_add(1, Ordering::SeqCst);
    *shared.recorded.predictor_body.lock().unwrap() = Some(body);
    *shared.recorded.predictor_auth.lock().unwrap() = authorization(&headers);

    Json(json!({ "predictions": ["forty-two"] }))
}
