//! Task types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::FailureCategory;
use crate::stages::Specification;

/// Where a task is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for a concurrency slot.
    Pending,
    /// Validating the specification.
    Planning,
    /// Exploring and planning.
    Searching,
    /// Producing a candidate.
    Implementing,
    /// Verifying, reviewing, or summarizing a candidate.
    Executing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Planning => "planning",
            TaskStatus::Searching => "searching",
            TaskStatus::Implementing => "implementing",
            TaskStatus::Executing => "executing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "planning" => Some(TaskStatus::Planning),
            "searching" => Some(TaskStatus::Searching),
            "implementing" => Some(TaskStatus::Implementing),
            "executing" => Some(TaskStatus::Executing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Terminal statuses are only reached through an outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Reference from a terminal task to exactly one outcome record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeRef {
    Success {
        artifact_id: String,
    },
    Failure {
        failure_id: String,
        category: FailureCategory,
        message: String,
    },
    /// Failure whose record could not be stored.
    Unrecorded {
        category: FailureCategory,
        message: String,
    },
}

impl OutcomeRef {
    /// Status a task takes when this outcome is attached.
    pub fn terminal_status(&self) -> TaskStatus {
        match self {
            OutcomeRef::Success { .. } => TaskStatus::Completed,
            OutcomeRef::Failure { .. } | OutcomeRef::Unrecorded { .. } => TaskStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeRef::Success { .. })
    }

    /// Failure category and message, `None` for a success.
    pub fn failure(&self) -> Option<(FailureCategory, &str)> {
        match self {
            OutcomeRef::Success { .. } => None,
            OutcomeRef::Failure {
                category, message, ..
            }
            | OutcomeRef::Unrecorded { category, message } => Some((*category, message)),
        }
    }
}

/// One specification being driven through the refinement pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Durable identifier (UUID v4).
    pub id: String,
    /// Short identifier shown to clients (`task_` + 12 hex chars).
    pub public_id: String,
    pub job_id: String,
    pub specification: Specification,
    pub status: TaskStatus,
    /// Current refinement iteration (0 before the first implementation).
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn error_message(&self) -> Option<&str> {
        self.outcome
            .as_ref()
            .and_then(OutcomeRef::failure)
            .map(|(_, message)| message)
    }
}

/// Generate a short public task id.
pub fn new_public_task_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("task_{}", &hex[..12])
}
