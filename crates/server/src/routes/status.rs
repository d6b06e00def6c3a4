//! Polling adapter.
//!
//! - GET /generate-video/status?jobId= - current result, `{"status":"pending"}` if unknown

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use vidgen_broker::JobResult;

use crate::error::ApiResult;
use crate::routes::JobQuery;
use crate::state::AppState;

async fn job_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<JobResult>> {
    let job_id = query.require_job_id()?;
    let result = state
        .broker
        .get(job_id.as_str())
        .unwrap_or_else(JobResult::pending);
    Ok(Json(result))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/generate-video/status", get(job_status))
}
