//! Callback from the automation engine.
//!
//! - POST /generate-video/callback
//!   - `{ jobId }` registers a pending job
//!   - `{ jobId, status: "done"|"error", videoUrl?, videoName?, error?, prompt?, duration? }`
//!     publishes the terminal result
//!
//! Every request must carry the shared secret in `x-n8n-secret`; it is checked
//! before the body is looked at.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use vidgen_broker::{JobId, JobOutcome, JobStatus, PublishOutcome};

use crate::error::{ApiError, ApiResult};
use crate::external::media::is_hosted_on;
use crate::external::GeneratedVideo;
use crate::metrics::{
    record_callback_rejection, record_duplicate_publish, record_jobs_tracked, record_publish,
    record_registration,
};
use crate::routes::require_job_id;
use crate::state::AppState;

pub const SECRET_HEADER: &str = "x-n8n-secret";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub job_id: Option<String>,
    pub status: Option<String>,
    pub video_url: Option<String>,
    pub video_name: Option<String>,
    pub error: Option<String>,
    pub prompt: Option<String>,
    /// Number or numeric string, whatever the workflow forwarded.
    pub duration: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct CallbackResponse {
    pub ok: bool,
    pub message: String,
}

impl CallbackResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            ok: true,
            message: message.to_string(),
        })
    }
}

fn verify_secret(headers: &HeaderMap, expected: Option<&str>) -> ApiResult<()> {
    let Some(expected) = expected else {
        tracing::warn!("callback rejected: no callback secret configured");
        record_callback_rejection("secret");
        return Err(ApiError::Unauthorized("Invalid secret".to_string()));
    };

    let provided = headers
        .get(SECRET_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if bool::from(provided.ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!(
            present = headers.contains_key(SECRET_HEADER),
            "callback rejected: secret mismatch"
        );
        record_callback_rejection("secret");
        Err(ApiError::Unauthorized("Invalid secret".to_string()))
    }
}

fn parse_terminal_status(raw: &str) -> Option<JobStatus> {
    match raw.trim() {
        "done" => Some(JobStatus::Done),
        "error" => Some(JobStatus::Error),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_duration(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn handle_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CallbackPayload>, JsonRejection>,
) -> ApiResult<Json<CallbackResponse>> {
    verify_secret(&headers, state.settings.callback_secret.as_deref())?;

    let Json(payload) = payload.map_err(|rejection| {
        record_callback_rejection("body");
        ApiError::BadRequest(rejection.body_text())
    })?;

    let job_id = require_job_id(payload.job_id.as_deref()).inspect_err(|_| {
        record_callback_rejection("job_id");
    })?;

    let status = match payload.status.as_deref().map(str::trim) {
        None | Some("") => {
            if state.broker.register(job_id.clone()) {
                record_registration();
                record_jobs_tracked(state.broker.len());
            }
            return Ok(CallbackResponse::ok("Job registered"));
        }
        Some(raw) => parse_terminal_status(raw).ok_or_else(|| {
            tracing::warn!(job_id = %job_id, status = %raw, "callback with invalid status");
            record_callback_rejection("status");
            ApiError::BadRequest("Invalid status. Must be 'done' or 'error'.".to_string())
        })?,
    };

    let already_finished = state
        .broker
        .get(job_id.as_str())
        .is_some_and(|r| r.is_terminal());

    let outcome = match status {
        JobStatus::Done => {
            let mut video_url = non_empty(payload.video_url.clone());
            if video_url.is_none() {
                tracing::warn!(job_id = %job_id, "job reported done without a video URL");
            }
            if let Some(url) = video_url.as_deref() {
                if state.settings.compress_videos
                    && !already_finished
                    && !is_hosted_on(url, &state.settings.media_host)
                {
                    video_url = Some(recompress(&state, &job_id, url).await);
                }
            }
            JobOutcome::Done {
                video_url,
                video_name: non_empty(payload.video_name.clone()),
            }
        }
        _ => JobOutcome::Failed {
            error: non_empty(payload.error.clone()).unwrap_or_else(|| "Unknown error".to_string()),
        },
    };

    let persisted = match &outcome {
        JobOutcome::Done {
            video_url: Some(url),
            video_name,
        } => Some((url.clone(), video_name.clone())),
        _ => None,
    };

    match state.broker.publish(job_id.clone(), outcome) {
        PublishOutcome::Duplicate => {
            record_duplicate_publish();
        }
        PublishOutcome::Stored { notified } => {
            record_publish(status);
            record_jobs_tracked(state.broker.len());
            tracing::info!(job_id = %job_id, status = ?status, notified, "job completed");

            if let Some((video_url, video_name)) = persisted {
                persist_video(&state, &job_id, &payload, video_url, video_name).await;
            }
        }
    }

    Ok(CallbackResponse::ok("Job completed"))
}

/// Upload `url` to the media store, falling back to the original URL on failure.
async fn recompress(state: &AppState, job_id: &JobId, url: &str) -> String {
    match state.media.recompress(url).await {
        Ok(compressed) => {
            tracing::info!(job_id = %job_id, url = %compressed, "video recompressed");
            compressed
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "recompression failed, keeping original URL");
            url.to_string()
        }
    }
}

async fn persist_video(
    state: &AppState,
    job_id: &JobId,
    payload: &CallbackPayload,
    video_url: String,
    video_name: Option<String>,
) {
    let prompt = non_empty(payload.prompt.clone());
    let duration = payload.duration.as_ref().and_then(parse_duration);

    let (Some(prompt), Some(duration)) = (prompt, duration) else {
        tracing::warn!(job_id = %job_id, "completion without prompt or duration, not saved");
        return;
    };

    let record = GeneratedVideo {
        job_id: job_id.clone(),
        video_url,
        video_name,
        prompt,
        duration,
        status: JobStatus::Done,
        created_at: Utc::now(),
    };

    match state.videos.save_generated_video(record).await {
        Ok(doc_id) => tracing::info!(job_id = %job_id, doc_id = %doc_id, "generated video saved"),
        Err(e) => tracing::error!(job_id = %job_id, error = %e, "failed to save generated video"),
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/generate-video/callback", post(handle_callback))
}
