//! Job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stages::Specification;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, tasks not yet launched.
    Pending,
    /// Tasks launched, at least one outcome outstanding.
    Processing,
    /// Every task reported an outcome.
    Completed,
    /// The batch could not be launched.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Progress counters of a job.
///
/// `completed + failed <= total` always holds; once every task has been
/// launched `completed + failed + in_progress == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub in_progress: u32,
}

impl JobCounters {
    /// Tasks that have reported an outcome.
    pub fn reported(&self) -> u32 {
        self.completed + self.failed
    }

    /// True when every task has reported and the job was not empty.
    pub fn is_done(&self) -> bool {
        self.total > 0 && self.reported() == self.total
    }
}

/// Atomic counter change applied by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDelta {
    /// A task run was launched.
    Started,
    /// A launched task finished with a success outcome.
    Succeeded,
    /// A launched task finished with a failure outcome.
    Failed,
}

impl CounterDelta {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterDelta::Started => "started",
            CounterDelta::Succeeded => "succeeded",
            CounterDelta::Failed => "failed",
        }
    }
}

/// A batch of independent artifact requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Durable identifier (UUID v4).
    pub id: String,
    /// Short identifier shown to clients (`job_` + 8 hex chars).
    pub public_id: String,
    pub owner: String,
    pub specifications: Vec<Specification>,
    pub status: JobStatus,
    #[serde(flatten)]
    pub counters: JobCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Generate a short public job id.
pub fn new_public_job_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("job_{}", &hex[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_counters_done() {
        let counters = JobCounters {
            total: 3,
            completed: 2,
            failed: 1,
            in_progress: 0,
        };
        assert!(counters.is_done());

        let empty = JobCounters::default();
        assert!(!empty.is_done());

        let partial = JobCounters {
            total: 3,
            completed: 1,
            failed: 0,
            in_progress: 2,
        };
        assert!(!partial.is_done());
    }

    #[test]
    fn test_public_job_id_format() {
        let id = new_public_job_id();
        assert!(id.starts_with("job_"));
        assert_eq!(id.len(), 12);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_job_serializes_flat_counters() {
        let now = Utc::now();
        let job = Job {
            id: "id".to_string(),
            public_id: "job_deadbeef".to_string(),
            owner: "alice".to_string(),
            specifications: vec![Specification::new("parse csv")],
            status: JobStatus::Processing,
            counters: JobCounters {
                total: 1,
                completed: 0,
                failed: 0,
                in_progress: 1,
            },
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["in_progress"], 1);
        assert!(json.get("error_message").is_none());
    }
}
