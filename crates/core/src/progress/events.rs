use serde::{Deserialize, Serialize};

use crate::outcome::FailureCategory;

/// Progress events emitted on every job/task state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    // Service lifecycle
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Jobs
    JobCreated {
        job_id: String,
        public_id: String,
        owner: String,
        total: u32,
    },
    JobStatusChanged {
        job_id: String,
        from_status: String,
        to_status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    JobCountersChanged {
        job_id: String,
        total: u32,
        completed: u32,
        failed: u32,
        in_progress: u32,
    },

    // Tasks
    TaskStatusChanged {
        job_id: String,
        task_id: String,
        from_status: String,
        to_status: String,
        iteration: u32,
    },
    TaskIterationStarted {
        job_id: String,
        task_id: String,
        iteration: u32,
        max_iterations: u32,
    },
    TaskFinished {
        job_id: String,
        task_id: String,
        success: bool,
        iterations: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<FailureCategory>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ProgressEvent {
    /// Returns the event type as a string for storage/filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            ProgressEvent::ServiceStarted { .. } => "service_started",
            ProgressEvent::ServiceStopped { .. } => "service_stopped",
            ProgressEvent::JobCreated { .. } => "job_created",
            ProgressEvent::JobStatusChanged { .. } => "job_status_changed",
            ProgressEvent::JobCountersChanged { .. } => "job_counters_changed",
            ProgressEvent::TaskStatusChanged { .. } => "task_status_changed",
            ProgressEvent::TaskIterationStarted { .. } => "task_iteration_started",
            ProgressEvent::TaskFinished { .. } => "task_finished",
        }
    }

    /// Returns the job ID if this event is job-related.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ProgressEvent::ServiceStarted { .. } | ProgressEvent::ServiceStopped { .. } => None,
            ProgressEvent::JobCreated { job_id, .. }
            | ProgressEvent::JobStatusChanged { job_id, .. }
            | ProgressEvent::JobCountersChanged { job_id, .. }
            | ProgressEvent::TaskStatusChanged { job_id, .. }
            | ProgressEvent::TaskIterationStarted { job_id, .. }
            | ProgressEvent::TaskFinished { job_id, .. } => Some(job_id),
        }
    }

    /// Returns the task ID if this event is task-related.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ProgressEvent::TaskStatusChanged { task_id, .. }
            | ProgressEvent::TaskIterationStarted { task_id, .. }
            | ProgressEvent::TaskFinished { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}
