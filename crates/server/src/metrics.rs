//! Application metrics for Prometheus monitoring.
//!
//! This module provides:
//! - Prometheus metrics recorder initialization
//! - Metric descriptions for the job lifecycle
//! - Helper functions for recording metrics

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use vidgen_broker::JobStatus;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// This should be called once at application startup, before any metrics are recorded.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "vidgen_jobs_registered_total",
        "Jobs registered by the automation engine"
    );
    describe_counter!(
        "vidgen_jobs_published_total",
        "Terminal results stored, by status"
    );
    describe_counter!(
        "vidgen_duplicate_publishes_total",
        "Terminal results discarded because the job had already finished"
    );
    describe_counter!(
        "vidgen_callback_rejections_total",
        "Callbacks rejected before touching broker state, by reason"
    );
    describe_counter!(
        "vidgen_submissions_total",
        "Generation submissions, by outcome"
    );
    describe_counter!(
        "vidgen_streams_opened_total",
        "Event streams opened, by whether the result was already available"
    );
    describe_gauge!("vidgen_jobs_tracked", "Jobs currently held by the broker");
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_registration() {
    counter!("vidgen_jobs_registered_total").increment(1);
}

pub fn record_publish(status: JobStatus) {
    counter!("vidgen_jobs_published_total", "status" => status.as_str()).increment(1);
}

pub fn record_duplicate_publish() {
    counter!("vidgen_duplicate_publishes_total").increment(1);
}

/// # Arguments
/// * `reason` - `"secret"`, `"body"`, `"job_id"` or `"status"`
pub fn record_callback_rejection(reason: &'static str) {
    counter!("vidgen_callback_rejections_total", "reason" => reason).increment(1);
}

/// # Arguments
/// * `outcome` - e.g. `"accepted"`, `"no_credits"`, `"engine_timeout"`
pub fn record_submission(outcome: &'static str) {
    counter!("vidgen_submissions_total", "outcome" => outcome).increment(1);
}

pub fn record_stream_opened(immediate: bool) {
    let mode = if immediate { "immediate" } else { "deferred" };
    counter!("vidgen_streams_opened_total", "mode" => mode).increment(1);
}

pub fn record_jobs_tracked(count: usize) {
    gauge!("vidgen_jobs_tracked").set(count as f64);
}
