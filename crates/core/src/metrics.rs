//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Tasks (outcomes, iterations used)
//! - Stage collaborators (latency, errors)
//! - Jobs (submitted, completed)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Tasks
// =============================================================================

/// Terminal task outcomes by result and failure category.
pub static TASKS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forge_tasks_finished_total", "Tasks that reached a terminal state"),
        &["result", "category"], // result: "success", "failure"; category "" for success
    )
    .unwrap()
});

/// Iterations used per finished task.
pub static TASK_ITERATIONS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "forge_task_iterations",
            "Refinement iterations used per finished task",
        )
        .buckets(vec![0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0]),
        &["result"],
    )
    .unwrap()
});

/// Wall time of a task run, from launch to outcome.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("forge_task_duration_seconds", "Duration of task runs").buckets(
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0],
        ),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Stages
// =============================================================================

/// Stage call duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("forge_stage_duration_seconds", "Duration of stage calls")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["stage"],
    )
    .unwrap()
});

/// Stage errors by stage and kind.
pub static STAGE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("forge_stage_errors_total", "Stage calls that failed"),
        &["stage", "kind"], // kind: "failed", "malformed", "timeout", "transport"
    )
    .unwrap()
});

// =============================================================================
// Jobs
// =============================================================================

/// Jobs accepted by the scheduler.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("forge_jobs_submitted_total", "Total jobs submitted").unwrap()
});

/// Jobs that reached completion.
pub static JOBS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("forge_jobs_completed_total", "Total jobs completed").unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TASKS_FINISHED.clone()),
        Box::new(TASK_ITERATIONS.clone()),
        Box::new(TASK_DURATION.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(STAGE_ERRORS.clone()),
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_COMPLETED.clone()),
    ]
}
