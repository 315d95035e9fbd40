//! Task storage trait and types.

use thiserror::Error;

use super::{OutcomeRef, Task, TaskStatus};
use crate::outcome::FailureCategory;
use crate::stages::Specification;

/// Error type for task operations.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Cannot perform operation due to current status.
    #[error("Cannot {operation} task {task_id}: current status is {current_status}")]
    InvalidState {
        task_id: String,
        current_status: String,
        operation: String,
    },

    #[error("Database error: {0}")]
    Database(String),
}

/// Request to create a new task.
#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub job_id: String,
    pub specification: Specification,
}

/// Filter for querying tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub job_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self {
            job_id: None,
            status: None,
            limit: 1000,
            offset: 0,
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
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

/// Trait for task storage backends.
///
/// Terminal tasks are immutable: every write to a task in `Completed` or
/// `Failed` is rejected with `TaskError::InvalidState`.
pub trait TaskStore: Send + Sync {
    /// Create a task in `Pending`.
    fn create(&self, request: CreateTaskRequest) -> Result<Task, TaskError>;

    /// Get a task by durable or public id.
    fn get(&self, id: &str) -> Result<Option<Task>, TaskError>;

    /// List tasks matching the filter, oldest first.
    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError>;

    /// Count tasks matching the filter.
    fn count(&self, filter: &TaskFilter) -> Result<i64, TaskError>;

    /// Move a task to a non-terminal status.
    fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, TaskError>;

    /// Record the iteration the task is currently on.
    fn set_iteration(&self, id: &str, iteration: u32) -> Result<(), TaskError>;

    /// Attach the task's outcome and move it to the matching terminal status.
    ///
    /// Succeeds at most once per task.
    fn set_outcome(&self, id: &str, outcome: OutcomeRef) -> Result<Task, TaskError>;

    /// Move a task to `Failed` when no outcome record could be stored.
    fn fail_unrecorded(&self, id: &str, message: &str) -> Result<Task, TaskError> {
        self.set_outcome(
            id,
            OutcomeRef::Unrecorded {
                category: FailureCategory::InternalError,
                message: message.to_string(),
            },
        )
    }

    /// All tasks of a job.
    fn list_by_job(&self, job_id: &str) -> Result<Vec<Task>, TaskError> {
        self.list(&TaskFilter::new().with_job(job_id).with_limit(i64::MAX))
    }
}
