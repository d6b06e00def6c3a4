#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use vidgen_server::external::{AutomationEngine, EngineError, GenerationRequest};
use vidgen_server::routes::callback::SECRET_HEADER;
use vidgen_server::Settings;

pub const SECRET: &str = "test-secret";

pub fn settings() -> Settings {
    Settings {
        callback_secret: Some(SECRET.to_string()),
        registration_timeout: Duration::from_millis(500),
        registration_poll: Duration::from_millis(10),
        registration_fallback_after: Duration::from_millis(100),
        ..Settings::default()
    }
}

/// Helper to make a request to the app.
pub async fn request(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);

    let body = if let Some(json) = body {
        builder = builder.header("content-type", "application/json");
        Body::from(serde_json::to_string(&json).unwrap())
    } else {
        Body::empty()
    };

    send(app, builder.body(body).unwrap()).await
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub fn callback_request(secret: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/generate-video/callback")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Post an authenticated callback.
pub async fn callback(app: Router, body: serde_json::Value) -> (StatusCode, String) {
    send(app, callback_request(Some(SECRET), body)).await
}

pub async fn status_of(app: Router, job_id: &str) -> serde_json::Value {
    let (status, body) = request(
        app,
        "GET",
        &format!("/api/generate-video/status?jobId={job_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "status body: {body}");
    serde_json::from_str(&body).unwrap()
}

pub enum EngineBehavior {
    /// Registers the correlation id it was handed.
    EchoCorrelation,
    /// Registers an id of its own choosing.
    MintOwnId(&'static str),
    /// Registers `id` for requests with this prompt and echoes the rest.
    MintFor {
        prompt: &'static str,
        id: &'static str,
    },
    /// Accepts the request and never calls back.
    Silent,
}

/// Engine stand-in that calls back into the app the way the real workflow does.
pub struct FakeEngine {
    pub app: OnceLock<Router>,
    behavior: EngineBehavior,
    delay: fn(&GenerationRequest) -> Duration,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeEngine {
    pub fn new(behavior: EngineBehavior) -> Self {
        Self {
            app: OnceLock::new(),
            behavior,
            delay: |_| Duration::from_millis(20),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Pick the registration callback delay per request.
    pub fn with_delay(mut self, delay: fn(&GenerationRequest) -> Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The request the engine received with this prompt.
    pub fn request_for(&self, prompt: &str) -> Option<GenerationRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.prompt == prompt)
            .cloned()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutomationEngine for FakeEngine {
    async fn start(&self, request: &GenerationRequest) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let job_id = match &self.behavior {
            EngineBehavior::EchoCorrelation => Some(request.job_id.to_string()),
            EngineBehavior::MintOwnId(id) => Some(id.to_string()),
            EngineBehavior::MintFor { prompt, id } if request.prompt == *prompt => {
                Some(id.to_string())
            }
            EngineBehavior::MintFor { .. } => Some(request.job_id.to_string()),
            EngineBehavior::Silent => None,
        };

        let delay = (self.delay)(request);
        if let (Some(job_id), Some(app)) = (job_id, self.app.get().cloned()) {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                callback(app, serde_json::json!({ "jobId": job_id })).await;
            });
        }
        Ok(())
    }
}
