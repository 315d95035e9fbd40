//! Success and failure records produced by terminal tasks.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteOutcomeStore;
pub use store::{OutcomeError, OutcomeStore};
pub use types::{ArtifactRecord, FailureCategory, FailureRecord, NewArtifact, NewFailure};
