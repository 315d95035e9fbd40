//! Job storage trait and types.

use thiserror::Error;

use super::{CounterDelta, Job, JobCounters, JobStatus};
use crate::stages::Specification;

/// Error type for job operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Cannot perform operation due to current status.
    #[error("Cannot {operation} job {job_id}: current status is {current_status}")]
    InvalidState {
        job_id: String,
        current_status: String,
        operation: String,
    },

    /// A counter change would break `completed + failed + in_progress <= total`.
    #[error("Counter update '{delta}' rejected for job {job_id}")]
    CounterRejected { job_id: String, delta: String },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Request to create a new job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    /// Who submitted the job.
    pub owner: String,
    /// One entry per task to create.
    pub specifications: Vec<Specification>,
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub owner: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            owner: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for job storage backends.
///
/// Counter updates must be atomic with respect to concurrent callers:
/// implementations apply each delta as a single conditional write.
pub trait JobStore: Send + Sync {
    /// Create a job in `Pending` with `total` equal to the number of specifications.
    fn create(&self, request: CreateJobRequest) -> Result<Job, JobError>;

    /// Get a job by durable or public id.
    fn get(&self, id: &str) -> Result<Option<Job>, JobError>;

    /// List jobs matching the filter, newest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError>;

    /// Count jobs matching the filter.
    fn count(&self, filter: &JobFilter) -> Result<i64, JobError>;

    /// Move a non-terminal job to a new status. Use `try_complete` for completion.
    fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<Job, JobError>;

    /// Atomically apply a counter delta and return the resulting counters.
    fn apply_counter(&self, id: &str, delta: CounterDelta) -> Result<JobCounters, JobError>;

    /// Transition to `Completed` if every task reported and the job is not yet terminal.
    ///
    /// Returns true only for the caller that performed the transition.
    fn try_complete(&self, id: &str) -> Result<bool, JobError>;
}
