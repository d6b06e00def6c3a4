//! Streaming adapter.
//!
//! - GET /generate-video/stream?jobId= - SSE stream that emits exactly one
//!   `data:` frame with the terminal result, then closes. Keepalive comments
//!   are sent while the job is pending.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use vidgen_broker::JobId;

use crate::error::ApiResult;
use crate::metrics::record_stream_opened;
use crate::routes::JobQuery;
use crate::state::AppState;

/// Logs when a client goes away before its result arrived.
struct DisconnectWatch {
    job_id: JobId,
    delivered: bool,
}

impl Drop for DisconnectWatch {
    fn drop(&mut self) {
        if !self.delivered {
            tracing::debug!(job_id = %self.job_id, "event stream closed before result");
        }
    }
}

async fn job_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let job_id = query.require_job_id()?;

    // Subscribing checks for a finished result under the broker lock, so a
    // publish racing with this call is delivered exactly once either way.
    let waiter = state.broker.subscribe_channel(job_id.clone());
    let immediate = waiter.is_immediate();
    record_stream_opened(immediate);
    tracing::info!(job_id = %job_id, immediate, "event stream opened");

    let stream = async_stream::stream! {
        let mut watch = DisconnectWatch { job_id, delivered: false };

        // Dropping the stream (client disconnect) drops the waiter, which
        // unsubscribes from the broker.
        match waiter.wait().await {
            Some(result) => match Event::default().json_data(&result) {
                Ok(event) => {
                    watch.delivered = true;
                    tracing::debug!(job_id = %watch.job_id, status = ?result.status, "pushing result");
                    yield Ok(event);
                }
                Err(e) => {
                    tracing::error!(job_id = %watch.job_id, error = %e, "failed to encode result");
                }
            },
            None => {
                tracing::info!(job_id = %watch.job_id, "stream displaced by a newer subscriber");
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.settings.keepalive)
            .text("keepalive"),
    ))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/generate-video/stream", get(job_stream))
}
