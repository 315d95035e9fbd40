//! Types for the task scheduler.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::limiter::LimiterStatus;
use crate::job::{JobError, JobStore};
use crate::outcome::{OutcomeError, OutcomeStore};
use crate::task::{TaskError, TaskStore};

/// Errors returned by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job must contain at least one specification.
    #[error("job has no specifications")]
    EmptyJob,

    /// The scheduler has been shut down.
    #[error("scheduler is not running")]
    NotRunning,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("job store error: {0}")]
    JobStore(#[from] JobError),

    #[error("task store error: {0}")]
    TaskStore(#[from] TaskError),

    #[error("outcome store error: {0}")]
    OutcomeStore(#[from] OutcomeError),
}

/// Stores the scheduler reads and writes.
#[derive(Clone)]
pub struct SchedulerStores {
    pub jobs: Arc<dyn JobStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub outcomes: Arc<dyn OutcomeStore>,
}

/// Current status of the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether new jobs are accepted.
    pub running: bool,
    /// Task runs spawned and not yet finalized (queued or executing).
    pub active_tasks: usize,
    pub limiter: LimiterStatus,
}
