//! SQLite-backed outcome store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    ArtifactRecord, FailureCategory, FailureRecord, NewArtifact, NewFailure, OutcomeError,
    OutcomeStore,
};
use crate::db;
use crate::stages::StageKind;

const ARTIFACT_COLUMNS: &str = "id, name, description, content, metadata, verification, iterations, task_id, job_id, created_at, updated_at";
const FAILURE_COLUMNS: &str = "id, task_id, job_id, specification, category, message, stage, iterations, partial, created_at";

/// SQLite-backed outcome store.
pub struct SqliteOutcomeStore {
    conn: Mutex<Connection>,
}

impl SqliteOutcomeStore {
    /// Create a new SQLite outcome store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, OutcomeError> {
        let conn = db::open(path).map_err(|e| OutcomeError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite outcome store (useful for testing).
    pub fn in_memory() -> Result<Self, OutcomeError> {
        let conn = db::open_in_memory().map_err(|e| OutcomeError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), OutcomeError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                verification TEXT NOT NULL,
                iterations INTEGER NOT NULL,
                task_id TEXT NOT NULL,
                job_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS failures (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                job_id TEXT NOT NULL,
                specification TEXT NOT NULL,
                category TEXT NOT NULL,
                message TEXT NOT NULL,
                stage TEXT,
                iterations INTEGER NOT NULL,
                partial TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_updated_at ON artifacts(updated_at);
            CREATE INDEX IF NOT EXISTS idx_failures_job_id ON failures(job_id);
            "#,
        )
        .map_err(|e| OutcomeError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, OutcomeError> {
        self.conn
            .lock()
            .map_err(|_| OutcomeError::Database("outcome store lock poisoned".to_string()))
    }

    fn row_to_artifact(row: &rusqlite::Row) -> rusqlite::Result<ArtifactRecord> {
        let metadata_json: String = row.get(4)?;
        let verification_json: String = row.get(5)?;
        let created_at: String = row.get(9)?;
        let updated_at: String = row.get(10)?;

        Ok(ArtifactRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            content: row.get(3)?,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            verification: serde_json::from_str(&verification_json).unwrap_or_default(),
            iterations: row.get(6)?,
            task_id: row.get(7)?,
            job_id: row.get(8)?,
            created_at: db::parse_timestamp(&created_at),
            updated_at: db::parse_timestamp(&updated_at),
        })
    }

    fn row_to_failure(row: &rusqlite::Row) -> rusqlite::Result<FailureRecord> {
        let specification_json: String = row.get(3)?;
        let category: String = row.get(4)?;
        let stage: Option<String> = row.get(6)?;
        let partial_json: Option<String> = row.get(8)?;
        let created_at: String = row.get(9)?;

        Ok(FailureRecord {
            id: row.get(0)?,
            task_id: row.get(1)?,
            job_id: row.get(2)?,
            specification: serde_json::from_str(&specification_json)
                .unwrap_or_else(|_| crate::stages::Specification::new("")),
            category: FailureCategory::parse(&category).unwrap_or(FailureCategory::InternalError),
            message: row.get(5)?,
            stage: stage.and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok()),
            iterations: row.get(7)?,
            partial: partial_json.and_then(|json| serde_json::from_str(&json).ok()),
            created_at: db::parse_timestamp(&created_at),
        })
    }

    fn get_artifact_with(
        conn: &Connection,
        column: &str,
        value: &str,
    ) -> Result<Option<ArtifactRecord>, OutcomeError> {
        conn.query_row(
            &format!(
                "SELECT {} FROM artifacts WHERE {} = ?",
                ARTIFACT_COLUMNS, column
            ),
            params![value],
            Self::row_to_artifact,
        )
        .optional()
        .map_err(|e| OutcomeError::Database(e.to_string()))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, OutcomeError> {
    serde_json::to_string(value).map_err(|e| OutcomeError::Serialization(e.to_string()))
}

fn stage_str(stage: Option<StageKind>) -> Option<&'static str> {
    stage.map(|s| s.as_str())
}

impl OutcomeStore for SqliteOutcomeStore {
    fn save_artifact(&self, artifact: NewArtifact) -> Result<ArtifactRecord, OutcomeError> {
        let conn = self.lock()?;
        let now = Utc::now();

        let metadata_json = to_json(&artifact.candidate.metadata)?;
        let verification_json = to_json(&artifact.verification)?;

        let existing = Self::get_artifact_with(&conn, "name", &artifact.candidate.name)?;

        let (id, created_at) = match existing {
            Some(record) => {
                conn.execute(
                    "UPDATE artifacts SET description = ?, content = ?, metadata = ?, verification = ?, iterations = ?, task_id = ?, job_id = ?, updated_at = ? WHERE id = ?",
                    params![
                        artifact.candidate.description,
                        artifact.candidate.content,
                        metadata_json,
                        verification_json,
                        artifact.iterations,
                        artifact.task_id,
                        artifact.job_id,
                        now.to_rfc3339(),
                        record.id,
                    ],
                )
                .map_err(|e| OutcomeError::Database(e.to_string()))?;
                tracing::debug!(
                    "Artifact '{}' already exists, updated record {}",
                    artifact.candidate.name,
                    record.id
                );
                (record.id, record.created_at)
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                conn.execute(
                    &format!(
                        "INSERT INTO artifacts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        ARTIFACT_COLUMNS
                    ),
                    params![
                        id,
                        artifact.candidate.name,
                        artifact.candidate.description,
                        artifact.candidate.content,
                        metadata_json,
                        verification_json,
                        artifact.iterations,
                        artifact.task_id,
                        artifact.job_id,
                        now.to_rfc3339(),
                        now.to_rfc3339(),
                    ],
                )
                .map_err(|e| OutcomeError::Database(e.to_string()))?;
                (id, now)
            }
        };

        Ok(ArtifactRecord {
            id,
            name: artifact.candidate.name,
            description: artifact.candidate.description,
            content: artifact.candidate.content,
            metadata: artifact.candidate.metadata,
            verification: artifact.verification,
            iterations: artifact.iterations,
            task_id: artifact.task_id,
            job_id: artifact.job_id,
            created_at,
            updated_at: now,
        })
    }

    fn save_failure(&self, failure: NewFailure) -> Result<FailureRecord, OutcomeError> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        let specification_json = to_json(&failure.specification)?;
        let partial_json = failure.partial.as_ref().map(to_json).transpose()?;

        conn.execute(
            &format!(
                "INSERT INTO failures ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                FAILURE_COLUMNS
            ),
            params![
                id,
                failure.task_id,
                failure.job_id,
                specification_json,
                failure.category.as_str(),
                failure.message,
                stage_str(failure.stage),
                failure.iterations,
                partial_json,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| OutcomeError::Database(e.to_string()))?;

        Ok(FailureRecord {
            id,
            task_id: failure.task_id,
            job_id: failure.job_id,
            specification: failure.specification,
            category: failure.category,
            message: failure.message,
            stage: failure.stage,
            iterations: failure.iterations,
            partial: failure.partial,
            created_at: now,
        })
    }

    fn get_artifact(&self, id: &str) -> Result<Option<ArtifactRecord>, OutcomeError> {
        let conn = self.lock()?;
        Self::get_artifact_with(&conn, "id", id)
    }

    fn get_failure(&self, id: &str) -> Result<Option<FailureRecord>, OutcomeError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM failures WHERE id = ?", FAILURE_COLUMNS),
            params![id],
            Self::row_to_failure,
        )
        .optional()
        .map_err(|e| OutcomeError::Database(e.to_string()))
    }

    fn list_artifacts(&self, limit: i64, offset: i64) -> Result<Vec<ArtifactRecord>, OutcomeError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM artifacts ORDER BY updated_at DESC LIMIT ? OFFSET ?",
                ARTIFACT_COLUMNS
            ))
            .map_err(|e| OutcomeError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit, offset], Self::row_to_artifact)
            .map_err(|e| OutcomeError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| OutcomeError::Database(e.to_string()))
    }

    fn list_failures_by_job(&self, job_id: &str) -> Result<Vec<FailureRecord>, OutcomeError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM failures WHERE job_id = ? ORDER BY created_at ASC",
                FAILURE_COLUMNS
            ))
            .map_err(|e| OutcomeError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![job_id], Self::row_to_failure)
            .map_err(|e| OutcomeError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| OutcomeError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{Candidate, Specification, Verification};

    fn create_test_store() -> SqliteOutcomeStore {
        SqliteOutcomeStore::in_memory().unwrap()
    }

    fn candidate(name: &str, content: &str) -> Candidate {
        Candidate {
            name: name.to_string(),
            description: format!("{} tool", name),
            content: content.to_string(),
            metadata: serde_json::json!({ "language": "python" }),
        }
    }

    fn new_artifact(name: &str, content: &str, task_id: &str) -> NewArtifact {
        NewArtifact {
            candidate: candidate(name, content),
            verification: Verification {
                passed: 4,
                failed: 0,
                errors: 0,
                details: vec![],
            },
            iterations: 2,
            task_id: task_id.to_string(),
            job_id: "job-1".to_string(),
        }
    }

    #[test]
    fn test_save_and_get_artifact() {
        let store = create_test_store();
        let saved = store
            .save_artifact(new_artifact("csv_parser", "v1", "task-1"))
            .unwrap();

        let fetched = store.get_artifact(&saved.id).unwrap().unwrap();
        assert_eq!(fetched.name, "csv_parser");
        assert_eq!(fetched.content, "v1");
        assert_eq!(fetched.verification.passed, 4);
        assert_eq!(fetched.metadata["language"], "python");
    }

    #[test]
    fn test_artifact_deduplicated_by_name() {
        let store = create_test_store();
        let first = store
            .save_artifact(new_artifact("csv_parser", "v1", "task-1"))
            .unwrap();
        let second = store
            .save_artifact(new_artifact("csv_parser", "v2", "task-2"))
            .unwrap();

        assert_eq!(first.id, second.id);
        let fetched = store.get_artifact(&first.id).unwrap().unwrap();
        assert_eq!(fetched.content, "v2");
        assert_eq!(fetched.task_id, "task-2");
        assert_eq!(store.list_artifacts(10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_save_failure_with_partial() {
        let store = create_test_store();
        let saved = store
            .save_failure(NewFailure {
                task_id: "task-1".to_string(),
                job_id: "job-1".to_string(),
                specification: Specification::new("parse csv").with_output("rows"),
                category: FailureCategory::MaxIterationsExceeded,
                message: "still broken".to_string(),
                stage: Some(StageKind::Review),
                iterations: 3,
                partial: Some(candidate("csv_parser", "draft")),
            })
            .unwrap();

        let fetched = store.get_failure(&saved.id).unwrap().unwrap();
        assert_eq!(fetched.category, FailureCategory::MaxIterationsExceeded);
        assert_eq!(fetched.stage, Some(StageKind::Review));
        assert_eq!(fetched.specification.output.as_deref(), Some("rows"));
        assert_eq!(fetched.partial.unwrap().content, "draft");
    }

    #[test]
    fn test_list_failures_by_job() {
        let store = create_test_store();
        for job in ["job-1", "job-1", "job-2"] {
            store
                .save_failure(NewFailure {
                    task_id: "t".to_string(),
                    job_id: job.to_string(),
                    specification: Specification::new("x"),
                    category: FailureCategory::StageError,
                    message: "boom".to_string(),
                    stage: None,
                    iterations: 0,
                    partial: None,
                })
                .unwrap();
        }

        assert_eq!(store.list_failures_by_job("job-1").unwrap().len(), 2);
        assert_eq!(store.list_failures_by_job("job-2").unwrap().len(), 1);
        assert!(store.list_failures_by_job("job-3").unwrap().is_empty());
    }

    #[test]
    fn test_missing_records() {
        let store = create_test_store();
        assert!(store.get_artifact("nope").unwrap().is_none());
        assert!(store.get_failure("nope").unwrap().is_none());
    }
}
