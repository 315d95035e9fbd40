//! Outcome storage trait.

use thiserror::Error;

use super::{ArtifactRecord, FailureRecord, NewArtifact, NewFailure};

/// Error type for outcome operations.
#[derive(Debug, Error)]
pub enum OutcomeError {
    #[error("Outcome not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for outcome storage backends.
pub trait OutcomeStore: Send + Sync {
    /// Store an approved artifact, updating the record with the same name if one exists.
    fn save_artifact(&self, artifact: NewArtifact) -> Result<ArtifactRecord, OutcomeError>;

    /// Store a failure record.
    fn save_failure(&self, failure: NewFailure) -> Result<FailureRecord, OutcomeError>;

    fn get_artifact(&self, id: &str) -> Result<Option<ArtifactRecord>, OutcomeError>;

    fn get_failure(&self, id: &str) -> Result<Option<FailureRecord>, OutcomeError>;

    /// List artifacts, most recently updated first.
    fn list_artifacts(&self, limit: i64, offset: i64) -> Result<Vec<ArtifactRecord>, OutcomeError>;

    /// List the failure records of a job, oldest first.
    fn list_failures_by_job(&self, job_id: &str) -> Result<Vec<FailureRecord>, OutcomeError>;
}
