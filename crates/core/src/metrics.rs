//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Upload orchestration (uploads, parts, retries, bytes)
//! - Task status polling (observations, outcomes)
//! - The storage control plane (request counts and latency)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Upload Metrics
// =============================================================================

/// Uploads total by result.
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chronos_uploads_total", "Total upload operations"),
        // "committed", "validation", "initialization", "part_transfer", "commit", "cancelled"
        &["result"],
    )
    .unwrap()
});

/// Upload duration in seconds, from initialization to commit.
pub static UPLOAD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("chronos_upload_duration_seconds", "Duration of uploads").buckets(
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0],
        ),
        &["result"],
    )
    .unwrap()
});

/// Parts uploaded successfully.
pub static PARTS_UPLOADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("chronos_parts_uploaded_total", "Total parts uploaded").unwrap()
});

/// Part attempts that were retried.
pub static PART_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "chronos_part_retries_total",
        "Total part transfer attempts that were retried",
    )
    .unwrap()
});

/// Parts that failed after exhausting retries.
pub static PARTS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "chronos_parts_failed_total",
        "Total parts that failed after all attempts",
    )
    .unwrap()
});

/// Bytes accepted by the storage backend.
pub static BYTES_UPLOADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("chronos_bytes_uploaded_total", "Total bytes uploaded").unwrap()
});

// =============================================================================
// Polling Metrics
// =============================================================================

/// Status queries by result.
pub static TASK_POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chronos_task_polls_total", "Total task status queries"),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

/// Final poll outcomes.
pub static TASK_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chronos_task_outcomes_total", "Processing task poll outcomes"),
        &["outcome"], // "succeeded", "failed", "timed_out", "cancelled"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// Control plane request duration.
pub static BACKEND_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "chronos_backend_request_duration_seconds",
            "Duration of storage backend calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["operation"],
    )
    .unwrap()
});

/// Control plane requests total.
pub static BACKEND_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chronos_backend_requests_total",
            "Total storage backend requests",
        ),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record a finished backend call.
pub fn record_backend_request(operation: &str, success: bool, elapsed_secs: f64) {
    let status = if success { "success" } else { "error" };
    BACKEND_REQUESTS
        .with_label_values(&[operation, status])
        .inc();
    BACKEND_REQUEST_DURATION
        .with_label_values(&[operation])
        .observe(elapsed_secs);
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Uploads
        Box::new(UPLOADS_TOTAL.clone()),
        Box::new(UPLOAD_DURATION.clone()),
        Box::new(PARTS_UPLOADED.clone()),
        Box::new(PART_RETRIES.clone()),
        Box::new(PARTS_FAILED.clone()),
        Box::new(BYTES_UPLOADED.clone()),
        // Polling
        Box::new(TASK_POLLS.clone()),
        Box::new(TASK_OUTCOMES.clone()),
        // External services
        Box::new(BACKEND_REQUEST_DURATION.clone()),
        Box::new(BACKEND_REQUESTS.clone()),
    ]
}
