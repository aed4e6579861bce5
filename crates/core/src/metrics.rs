//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Export runs (outcome, duration, artifact size)
//! - Remote API calls (submit, status, download)
//! - Token acquisition (identity provider vs cache)
//! - Retries

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Export Run Metrics
// =============================================================================

/// Export runs total by result.
pub static EXPORT_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pbi_export_runs_total", "Total export runs"),
        &["result"], // "succeeded", "job_failed", "timeout", "cancelled", "error"
    )
    .unwrap()
});

/// Export run duration in seconds, from submit to download.
pub static EXPORT_RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pbi_export_run_duration_seconds",
            "Duration of export runs",
        )
        .buckets(vec![5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        &["result"],
    )
    .unwrap()
});

/// Status polls total.
pub static STATUS_POLLS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pbi_export_status_polls_total", "Total export status polls").unwrap()
});

/// Downloaded artifact size in bytes.
pub static ARTIFACT_BYTES: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("pbi_export_artifact_bytes", "Size of downloaded artifacts").buckets(
            vec![
                10_000.0,
                100_000.0,
                1_000_000.0,
                10_000_000.0,
                100_000_000.0,
            ],
        ),
    )
    .unwrap()
});

// =============================================================================
// Remote Service Metrics
// =============================================================================

/// API requests total by operation and outcome.
pub static API_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pbi_export_api_requests_total", "Total Power BI API requests"),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Token requests total by source.
pub static TOKEN_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pbi_export_token_requests_total", "Total access token requests"),
        &["source"], // "identity_provider", "cache"
    )
    .unwrap()
});

/// Retry attempts total by operation.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pbi_export_retry_attempts_total", "Total retry attempts"),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record the outcome of a remote API call.
pub fn record_api_request<T, E>(operation: &str, result: &Result<T, E>) {
    let status = if result.is_ok() { "success" } else { "error" };
    API_REQUESTS.with_label_values(&[operation, status]).inc();
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Runs
        Box::new(EXPORT_RUNS.clone()),
        Box::new(EXPORT_RUN_DURATION.clone()),
        Box::new(STATUS_POLLS.clone()),
        Box::new(ARTIFACT_BYTES.clone()),
        // Remote services
        Box::new(API_REQUESTS.clone()),
        Box::new(TOKEN_REQUESTS.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
    ]
}
