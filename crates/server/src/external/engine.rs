//! Client for the external automation engine that performs the actual
//! generation and later calls back into `/api/generate-video/callback`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use vidgen_broker::JobId;

/// Errors starting a generation, split by what the caller can do about them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine accepted the connection but did not answer in time.
    #[error("automation engine did not respond within {0:?}")]
    Timeout(Duration),

    /// The engine could not be reached (DNS, refused connection, TLS, ...).
    #[error("automation engine unreachable: {0}")]
    Unreachable(String),

    /// The engine answered with a non-2xx status.
    #[error("automation engine returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Payload posted to the engine's start webhook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub duration: serde_json::Value,
    pub site: String,
    /// Correlation id the engine should echo back as the job id.
    pub job_id: JobId,
}

#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Kick off a generation. Returns once the engine acknowledged the request,
    /// not when the video is ready.
    async fn start(&self, request: &GenerationRequest) -> Result<(), EngineError>;
}

/// Engine reached through an HTTP start webhook.
pub struct WebhookEngine {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookEngine {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, err: reqwest::Error) -> EngineError {
        if err.is_timeout() {
            EngineError::Timeout(self.timeout)
        } else {
            EngineError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl AutomationEngine for WebhookEngine {
    async fn start(&self, request: &GenerationRequest) -> Result<(), EngineError> {
        tracing::info!(
            url = %self.url,
            correlation_id = %request.job_id,
            "starting generation on automation engine"
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let body = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or_default().to_string()
        } else {
            body
        };
        tracing::warn!(status = status.as_u16(), body = %body, "automation engine rejected start request");
        Err(EngineError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a cat surfing".into(),
            duration: serde_json::json!(8),
            site: "softtechniques".into(),
            job_id: JobId::from("corr-1"),
        }
    }

    #[tokio::test]
    async fn test_start_posts_request_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/start"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "a cat surfing",
                "duration": 8,
                "site": "softtechniques",
                "jobId": "corr-1",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let engine =
            WebhookEngine::new(format!("{}/webhook/start", server.uri()), Duration::from_secs(2))
                .unwrap();
        engine.start(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("workflow inactive"))
            .mount(&server)
            .await;

        let engine = WebhookEngine::new(server.uri(), Duration::from_secs(2)).unwrap();
        match engine.start(&request()).await {
            Err(EngineError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "workflow inactive");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_error_body_falls_back_to_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let engine = WebhookEngine::new(server.uri(), Duration::from_secs(2)).unwrap();
        match engine.start(&request()).await {
            Err(EngineError::Rejected { body, .. }) => assert_eq!(body, "Not Found"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let engine = WebhookEngine::new(server.uri(), Duration::from_millis(100)).unwrap();
        assert!(matches!(
            engine.start(&request()).await,
            Err(EngineError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Bind then drop a listener so the port is known to be closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let engine =
            WebhookEngine::new(format!("http://{addr}/start"), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            engine.start(&request()).await,
            Err(EngineError::Unreachable(_))
        ));
    }
}
