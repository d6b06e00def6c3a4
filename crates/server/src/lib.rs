// crates/server/src/lib.rs
//! Vidgen server library.
//!
//! Axum application around the in-process job result broker: the credit-gated
//! submission endpoint, the engine callback, and the polling and SSE adapters
//! clients use to wait for a finished video.

pub mod admission;
pub mod config;
pub mod error;
pub mod external;
pub mod metrics;
pub mod registration;
pub mod routes;
pub mod state;
pub mod sweeper;

pub use config::{Config, Settings};
pub use error::*;
pub use metrics::init_metrics;
pub use routes::api_routes;
pub use state::AppState;
pub use sweeper::spawn_result_sweeper;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use vidgen_observability::with_request_tracing;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (submission, callback, status, stream, health) and `/metrics`
/// - CORS (allows any origin)
/// - Request ids and request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    with_request_tracing(api_routes(state).layer(cors))
}
