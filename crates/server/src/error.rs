// crates/server/src/error.rs
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::admission::AdmissionError;
use crate::external::{EngineError, StoreError};

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Job registration timeout after {0:?}")]
    RegistrationTimeout(Duration),
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::UnknownUser(user_id) => {
                ApiError::Unauthorized(format!("Unknown user: {user_id}"))
            }
            AdmissionError::NoCredits => ApiError::InsufficientCredits,
            AdmissionError::DecrementFailed => {
                ApiError::Internal("credit decrement did not apply".to_string())
            }
            AdmissionError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg.clone()))
            }
            ApiError::Unauthorized(msg) => {
                tracing::warn!(message = %msg, "Unauthorized");
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::with_details("Unauthorized", msg.clone()),
                )
            }
            ApiError::InsufficientCredits => (
                StatusCode::FORBIDDEN,
                ErrorResponse::with_details(
                    "Insufficient credits",
                    "No credits left for video generation.",
                ),
            ),
            ApiError::NotConfigured(what) => {
                tracing::error!(missing = %what, "Server not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Server not configured", what.clone()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
            ApiError::Engine(engine_err) => {
                tracing::error!(error = %engine_err, "Automation engine error");
                match engine_err {
                    EngineError::Timeout(_) => (
                        StatusCode::GATEWAY_TIMEOUT,
                        ErrorResponse::with_details(
                            "Automation engine timeout",
                            engine_err.to_string(),
                        ),
                    ),
                    EngineError::Unreachable(reason) => (
                        StatusCode::BAD_GATEWAY,
                        ErrorResponse::with_details(
                            "Automation engine unreachable",
                            reason.clone(),
                        ),
                    ),
                    EngineError::Rejected { body, .. } => (
                        StatusCode::BAD_GATEWAY,
                        ErrorResponse::with_details(
                            "Automation engine rejected the request",
                            body.clone(),
                        ),
                    ),
                }
            }
            ApiError::RegistrationTimeout(waited) => {
                tracing::warn!(waited_ms = waited.as_millis() as u64, "Job registration timeout");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    ErrorResponse::new("Job registration timeout."),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    /// Helper to extract status code and body from a response
    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_bad_request_returns_message_as_error() {
        let error = ApiError::BadRequest("jobId is required.".to_string());
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "jobId is required.");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_returns_401() {
        let error = ApiError::Unauthorized("bad secret".to_string());
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "Unauthorized");
    }

    #[tokio::test]
    async fn test_insufficient_credits_returns_403() {
        let (status, body) = extract_response(ApiError::InsufficientCredits.into_response()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error, "Insufficient credits");
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let error = ApiError::Internal("mutex poisoned at 0xdeadbeef".to_string());
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Internal server error");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_engine_errors_map_to_gateway_statuses() {
        let timeout = ApiError::from(EngineError::Timeout(Duration::from_secs(25)));
        let (status, _) = extract_response(timeout.into_response()).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

        let refused = ApiError::from(EngineError::Unreachable("connection refused".into()));
        let (status, body) = extract_response(refused.into_response()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.details.as_deref(), Some("connection refused"));

        let rejected = ApiError::from(EngineError::Rejected {
            status: 500,
            body: "workflow inactive".into(),
        });
        let (status, body) = extract_response(rejected.into_response()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.details.as_deref(), Some("workflow inactive"));
    }

    #[tokio::test]
    async fn test_registration_timeout_returns_504() {
        let error = ApiError::RegistrationTimeout(Duration::from_secs(3));
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body.error, "Job registration timeout.");
    }

    #[tokio::test]
    async fn test_admission_errors_convert() {
        let unknown = ApiError::from(AdmissionError::UnknownUser("u9".into()));
        let (status, body) = extract_response(unknown.into_response()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.details.unwrap().contains("u9"));

        let store = ApiError::from(AdmissionError::Store(StoreError::Unavailable(
            "timeout".into(),
        )));
        let (status, _) = extract_response(store.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_skips_missing_details() {
        let json = serde_json::to_string(&ErrorResponse::new("Oops")).unwrap();
        assert_eq!(json, r#"{"error":"Oops"}"#);
    }
}
