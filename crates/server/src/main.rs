// crates/server/src/main.rs
//! Vidgen server binary.
//!
//! Parses configuration, installs logging and metrics, wires the collaborators
//! into `AppState` and serves until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use vidgen_observability::init_tracing;
use vidgen_server::external::{MemoryCreditStore, WebhookEngine};
use vidgen_server::{create_app, init_metrics, spawn_result_sweeper, AppState, Config};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    let _log_guard = init_tracing(&config.log_config())?;

    init_metrics();

    let settings = config.settings();
    if settings.callback_secret.is_none() {
        tracing::warn!("N8N_CALLBACK_SECRET is not set, every engine callback will be rejected");
    }

    let mut state = AppState::in_memory(settings.clone());

    if let Some(path) = &config.accounts_file {
        let credits = MemoryCreditStore::from_file(path)
            .with_context(|| format!("loading accounts from {}", path.display()))?;
        state = state.with_credits(Arc::new(credits));
    } else {
        tracing::warn!("no accounts file configured, every submission will be refused");
    }

    match &config.start_webhook_url {
        Some(url) => {
            let engine = WebhookEngine::new(url.clone(), settings.engine_timeout)
                .context("building automation engine client")?;
            tracing::info!(url = %engine.url(), "automation engine configured");
            state = state.with_engine(Arc::new(engine));
        }
        None => tracing::warn!("N8N_START_WEBHOOK_URL is not set, submissions are disabled"),
    }

    let state = Arc::new(state);

    let sweeper = settings
        .result_ttl
        .map(|ttl| spawn_result_sweeper(state.broker.clone(), ttl, settings.sweep_interval));

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        version = env!("CARGO_PKG_VERSION"),
        "vidgen listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    Ok(())
}
