//! Terminal task outcome records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stages::{Candidate, Specification, StageKind, Verification};

/// Why a task ended without an approved artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Intake rejected the specification; no iteration was spent.
    InvalidSpecification,
    /// A stage collaborator errored, timed out, or returned a malformed response.
    StageError,
    /// Every iteration was rejected.
    MaxIterationsExceeded,
    /// The run was cancelled by an operator or by shutdown.
    Cancelled,
    /// The run panicked or its result could not be persisted.
    InternalError,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::InvalidSpecification => "invalid_specification",
            FailureCategory::StageError => "stage_error",
            FailureCategory::MaxIterationsExceeded => "max_iterations_exceeded",
            FailureCategory::Cancelled => "cancelled",
            FailureCategory::InternalError => "internal_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invalid_specification" => Some(FailureCategory::InvalidSpecification),
            "stage_error" => Some(FailureCategory::StageError),
            "max_iterations_exceeded" => Some(FailureCategory::MaxIterationsExceeded),
            "cancelled" => Some(FailureCategory::Cancelled),
            "internal_error" => Some(FailureCategory::InternalError),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An approved artifact.
///
/// Records are keyed by `name`: when another task converges on the same
/// name the existing record is updated in place and keeps its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub content: String,
    pub metadata: Value,
    pub verification: Verification,
    /// Iterations used by the producing task.
    pub iterations: u32,
    /// Task that most recently produced this artifact.
    pub task_id: String,
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for storing an approved artifact.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub candidate: Candidate,
    pub verification: Verification,
    pub iterations: u32,
    pub task_id: String,
    pub job_id: String,
}

/// Why a task failed, with the best partial result it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    pub task_id: String,
    pub job_id: String,
    pub specification: Specification,
    pub category: FailureCategory,
    pub message: String,
    /// Stage that failed, when the failure came from a stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageKind>,
    pub iterations: u32,
    /// Last candidate produced before the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<Candidate>,
    pub created_at: DateTime<Utc>,
}

/// Input for storing a failure record.
#[derive(Debug, Clone)]
pub struct NewFailure {
    pub task_id: String,
    pub job_id: String,
    pub specification: Specification,
    pub category: FailureCategory,
    pub message: String,
    pub stage: Option<StageKind>,
    pub iterations: u32,
    pub partial: Option<Candidate>,
}
