//! Job submission.
//!
//! - POST /generate-video `{ prompt, duration, userId }` → `{ jobId }`
//!
//! Order matters: validate input, make sure an engine is configured, spend a
//! credit, start the engine, then wait for the engine's registration callback
//! to show up in the broker.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use vidgen_broker::JobId;

use crate::admission::{admit, AdmissionError};
use crate::error::{ApiError, ApiResult};
use crate::external::{EngineError, GenerationRequest};
use crate::metrics::record_submission;
use crate::registration::{wait_for_registration, RegistrationTiming};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub prompt: Option<String>,
    pub duration: Option<serde_json::Value>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(Deserialize))]
pub struct SubmitResponse {
    pub job_id: JobId,
}

struct ValidSubmission {
    prompt: String,
    duration: serde_json::Value,
    user_id: String,
}

fn validate(body: SubmitRequest) -> ApiResult<ValidSubmission> {
    let user_id = body
        .user_id
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Missing userId".to_string()))?;

    let prompt = body
        .prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Prompt is required.".to_string()))?;

    let duration = body
        .duration
        .filter(|d| !d.is_null())
        .ok_or_else(|| ApiError::BadRequest("Duration is required.".to_string()))?;

    Ok(ValidSubmission {
        prompt,
        duration,
        user_id,
    })
}

fn engine_outcome(err: &EngineError) -> &'static str {
    match err {
        EngineError::Timeout(_) => "engine_timeout",
        EngineError::Unreachable(_) => "engine_unreachable",
        EngineError::Rejected { .. } => "engine_rejected",
    }
}

async fn submit_job(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let submission = validate(body).inspect_err(|_| record_submission("invalid"))?;

    let Some(engine) = state.engine.clone() else {
        record_submission("not_configured");
        return Err(ApiError::NotConfigured(
            "N8N_START_WEBHOOK_URL is not set".to_string(),
        ));
    };

    admit(
        state.credits.as_ref(),
        &submission.user_id,
        &state.settings.admin_emails,
    )
    .await
    .inspect_err(|e| {
        record_submission(match e {
            AdmissionError::UnknownUser(_) => "unknown_user",
            AdmissionError::NoCredits => "no_credits",
            AdmissionError::DecrementFailed | AdmissionError::Store(_) => "admission_failed",
        })
    })?;

    let correlation_id = JobId::from(uuid::Uuid::new_v4().to_string());
    let _in_flight = state.submissions.track(correlation_id.clone());
    let watermark = state.broker.watermark();
    let request = GenerationRequest {
        prompt: submission.prompt,
        duration: submission.duration,
        site: state.settings.site.clone(),
        job_id: correlation_id.clone(),
    };

    // The credit stays spent if the engine call fails.
    engine
        .start(&request)
        .await
        .inspect_err(|e| record_submission(engine_outcome(e)))?;

    let found = wait_for_registration(
        &state.broker,
        &state.submissions,
        &correlation_id,
        watermark,
        RegistrationTiming::from(&state.settings),
    )
    .await;

    match found {
        Some(job_id) => {
            record_submission("accepted");
            tracing::info!(
                job_id = %job_id,
                user_id = %submission.user_id,
                correlated = job_id == correlation_id,
                "generation started"
            );
            Ok(Json(SubmitResponse { job_id }))
        }
        None => {
            record_submission("registration_timeout");
            Err(ApiError::RegistrationTimeout(
                state.settings.registration_timeout,
            ))
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/generate-video", post(submit_job))
}
