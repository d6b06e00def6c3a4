//! API route handlers for the vidgen server.

pub mod callback;
pub mod health;
pub mod metrics;
pub mod status;
pub mod stream;
pub mod submit;

use std::sync::Arc;

use axum::Router;
use serde::Deserialize;
use vidgen_broker::JobId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query string shared by the status and stream endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct JobQuery {
    #[serde(rename = "jobId")]
    pub job_id: Option<String>,
}

impl JobQuery {
    pub fn require_job_id(&self) -> ApiResult<JobId> {
        require_job_id(self.job_id.as_deref())
    }
}

/// The job id exactly as sent, or 400 `jobId is required.` when absent or empty.
pub(crate) fn require_job_id(raw: Option<&str>) -> ApiResult<JobId> {
    match raw {
        Some(id) if !id.is_empty() => Ok(JobId::from(id)),
        _ => Err(ApiError::BadRequest("jobId is required.".to_string())),
    }
}

/// Create the combined router.
///
/// Routes:
/// - POST /api/generate-video - Start a generation (credit-gated)
/// - POST /api/generate-video/callback - Registration and completion callback from the engine
/// - GET  /api/generate-video/status?jobId= - Current result, `pending` if unknown
/// - GET  /api/generate-video/stream?jobId= - SSE stream with exactly one result frame
/// - GET  /api/health - Health check
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(submit::router())
        .merge(callback::router())
        .merge(status::router())
        .merge(stream::router());

    Router::new()
        .nest("/api", api)
        .merge(metrics::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_api_routes_creation() {
        let state = Arc::new(AppState::in_memory(Settings::default()));
        let _router = api_routes(state);
    }

    #[test]
    fn test_require_job_id_keeps_ids_opaque() {
        assert_eq!(require_job_id(Some(" abc ")).unwrap().as_str(), " abc ");
        assert_ne!(require_job_id(Some(" abc ")).unwrap(), JobId::from("abc"));
        assert!(require_job_id(Some("")).is_err());
        assert!(require_job_id(None).is_err());
        assert!(JobQuery::default().require_job_id().is_err());
    }
}
