use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::ProgressEvent;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A persisted progress event.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub job_id: Option<String>,
    pub task_id: Option<String>,
    pub data: ProgressEvent,
}

/// Filter for querying progress events.
#[derive(Debug, Clone, Default)]
pub struct ProgressFilter {
    pub job_id: Option<String>,
    pub task_id: Option<String>,
    pub event_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ProgressFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
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

/// Storage backend for progress events.
pub trait ProgressStore: Send + Sync {
    fn insert(&self, record: &ProgressRecord) -> Result<i64, ProgressError>;

    /// Query events in emission order.
    fn query(&self, filter: &ProgressFilter) -> Result<Vec<ProgressRecord>, ProgressError>;

    fn count(&self, filter: &ProgressFilter) -> Result<i64, ProgressError>;
}
