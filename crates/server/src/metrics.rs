//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the forge server:
//! - HTTP request metrics (latency, counts)
//! - Job and task counts by status (collected dynamically)
//! - Scheduler and concurrency limiter status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use forge_core::{JobFilter, JobStatus, TaskFilter, TaskStatus};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "forge_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forge_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "forge_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Job and Task Metrics (collected dynamically)
// =============================================================================

/// Jobs by current status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("forge_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

/// Tasks by current status.
pub static TASKS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("forge_tasks_by_status", "Current task count by status"),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics (collected dynamically)
// =============================================================================

/// Scheduler running state (1 = running, 0 = stopped).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "forge_scheduler_running",
        "Whether the scheduler accepts jobs (1) or is stopped (0)",
    )
    .unwrap()
});

/// Task runs holding a concurrency slot.
pub static LIMITER_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "forge_limiter_active",
        "Number of task runs holding a concurrency slot",
    )
    .unwrap()
});

/// Task runs waiting for a concurrency slot.
pub static LIMITER_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "forge_limiter_queued",
        "Number of task runs waiting for a concurrency slot",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Jobs and tasks
    registry.register(Box::new(JOBS_BY_STATUS.clone())).unwrap();
    registry.register(Box::new(TASKS_BY_STATUS.clone())).unwrap();

    // Scheduler
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(LIMITER_ACTIVE.clone())).unwrap();
    registry.register(Box::new(LIMITER_QUEUED.clone())).unwrap();

    // Core metrics (tasks, stages, jobs)
    for metric in forge_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the stores and the scheduler.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.scheduler().status().await;
    SCHEDULER_RUNNING.set(if status.running { 1 } else { 0 });
    LIMITER_ACTIVE.set(status.limiter.active as i64);
    LIMITER_QUEUED.set(status.limiter.queued as i64);

    for job_status in [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ] {
        let filter = JobFilter::new().with_status(job_status);
        if let Ok(count) = state.job_store().count(&filter) {
            JOBS_BY_STATUS
                .with_label_values(&[job_status.as_str()])
                .set(count);
        }
    }

    for task_status in [
        TaskStatus::Pending,
        TaskStatus::Planning,
        TaskStatus::Searching,
        TaskStatus::Implementing,
        TaskStatus::Executing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ] {
        let filter = TaskFilter::new().with_status(task_status);
        if let Ok(count) = state.task_store().count(&filter) {
            TASKS_BY_STATUS
                .with_label_values(&[task_status.as_str()])
                .set(count);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let public_id_regex = regex_lite::Regex::new(r"(job|task)_[0-9a-f]{8,12}").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = public_id_regex.replace_all(&result, "{id}");
    result.to_string()
}
