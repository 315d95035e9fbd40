//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    new_public_job_id, CounterDelta, CreateJobRequest, Job, JobCounters, JobError, JobFilter,
    JobStatus, JobStore,
};
use crate::db;
use crate::stages::Specification;

const JOB_COLUMNS: &str = "id, public_id, owner, specifications, status, total, completed, failed, in_progress, error_message, created_at, updated_at, completed_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = db::open(path).map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = db::open_in_memory().map_err(|e| JobError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                public_id TEXT NOT NULL UNIQUE,
                owner TEXT NOT NULL,
                specifications TEXT NOT NULL,
                status TEXT NOT NULL,
                total INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                in_progress INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                CHECK (completed + failed + in_progress <= total),
                CHECK (in_progress >= 0)
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, JobError> {
        self.conn
            .lock()
            .map_err(|_| JobError::Database("job store lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref owner) = filter.owner {
            conditions.push("owner = ?");
            params.push(Box::new(owner.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let specifications_json: String = row.get(3)?;
        let status_str: String = row.get(4)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        let specifications: Vec<Specification> =
            serde_json::from_str(&specifications_json).unwrap_or_default();

        Ok(Job {
            id: row.get(0)?,
            public_id: row.get(1)?,
            owner: row.get(2)?,
            specifications,
            status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Failed),
            counters: JobCounters {
                total: row.get(5)?,
                completed: row.get(6)?,
                failed: row.get(7)?,
                in_progress: row.get(8)?,
            },
            error_message: row.get(9)?,
            created_at: db::parse_timestamp(&created_at),
            updated_at: db::parse_timestamp(&updated_at),
            completed_at: db::parse_optional_timestamp(row.get(12)?),
        })
    }

    fn get_with(conn: &Connection, id: &str) -> Result<Option<Job>, JobError> {
        conn.query_row(
            &format!(
                "SELECT {} FROM jobs WHERE id = ?1 OR public_id = ?1",
                JOB_COLUMNS
            ),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(|e| JobError::Database(e.to_string()))
    }

    fn counters_with(conn: &Connection, id: &str) -> Result<Option<JobCounters>, JobError> {
        conn.query_row(
            "SELECT total, completed, failed, in_progress FROM jobs WHERE id = ?",
            params![id],
            |row| {
                Ok(JobCounters {
                    total: row.get(0)?,
                    completed: row.get(1)?,
                    failed: row.get(2)?,
                    in_progress: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| JobError::Database(e.to_string()))
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, request: CreateJobRequest) -> Result<Job, JobError> {
        let conn = self.lock()?;

        let id = uuid::Uuid::new_v4().to_string();
        let public_id = new_public_job_id();
        let now = Utc::now();
        let total = request.specifications.len() as u32;

        let specifications_json = serde_json::to_string(&request.specifications)
            .map_err(|e| JobError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO jobs (id, public_id, owner, specifications, status, total, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                public_id,
                request.owner,
                specifications_json,
                JobStatus::Pending.as_str(),
                total,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(Job {
            id,
            public_id,
            owner: request.owner,
            specifications: request.specifications,
            status: JobStatus::Pending,
            counters: JobCounters {
                total,
                ..Default::default()
            },
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.lock()?;
        Self::get_with(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            JOB_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| JobError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| JobError::Database(e.to_string()))
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| JobError::Database(e.to_string()))
    }

    fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<Job, JobError> {
        let conn = self.lock()?;

        let current = Self::get_with(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if current.status.is_terminal() || status == JobStatus::Completed {
            return Err(JobError::InvalidState {
                job_id: current.id,
                current_status: current.status.as_str().to_string(),
                operation: format!("move to {}", status.as_str()),
            });
        }

        let now = Utc::now();
        conn.execute(
            "UPDATE jobs SET status = ?, error_message = COALESCE(?, error_message), updated_at = ? WHERE id = ?",
            params![status.as_str(), error_message, now.to_rfc3339(), current.id],
        )
        .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(Job {
            status,
            error_message: error_message.or(current.error_message),
            updated_at: now,
            ..current
        })
    }

    fn apply_counter(&self, id: &str, delta: CounterDelta) -> Result<JobCounters, JobError> {
        let conn = self.lock()?;

        let sql = match delta {
            CounterDelta::Started => {
                "UPDATE jobs SET in_progress = in_progress + 1, updated_at = ?1 \
                 WHERE id = ?2 AND completed + failed + in_progress < total"
            }
            CounterDelta::Succeeded => {
                "UPDATE jobs SET in_progress = in_progress - 1, completed = completed + 1, updated_at = ?1 \
                 WHERE id = ?2 AND in_progress > 0"
            }
            CounterDelta::Failed => {
                "UPDATE jobs SET in_progress = in_progress - 1, failed = failed + 1, updated_at = ?1 \
                 WHERE id = ?2 AND in_progress > 0"
            }
        };

        let changed = conn
            .execute(sql, params![Utc::now().to_rfc3339(), id])
            .map_err(|e| JobError::Database(e.to_string()))?;

        let counters =
            Self::counters_with(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if changed == 0 {
            return Err(JobError::CounterRejected {
                job_id: id.to_string(),
                delta: delta.as_str().to_string(),
            });
        }

        Ok(counters)
    }

    fn try_complete(&self, id: &str) -> Result<bool, JobError> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                "UPDATE jobs SET status = ?1, completed_at = ?2, updated_at = ?2 \
                 WHERE id = ?3 AND status IN (?4, ?5) AND total > 0 AND completed + failed = total",
                params![
                    JobStatus::Completed.as_str(),
                    now,
                    id,
                    JobStatus::Pending.as_str(),
                    JobStatus::Processing.as_str(),
                ],
            )
            .map_err(|e| JobError::Database(e.to_string()))?;

        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteJobStore {
        SqliteJobStore::in_memory().unwrap()
    }

    fn create_test_request(n: usize) -> CreateJobRequest {
        CreateJobRequest {
            owner: "test-user".to_string(),
            specifications: (0..n)
                .map(|i| Specification::new(format!("artifact {}", i)))
                .collect(),
        }
    }

    #[test]
    fn test_create_job() {
        let store = create_test_store();
        let job = store.create(create_test_request(3)).unwrap();

        assert!(!job.id.is_empty());
        assert!(job.public_id.starts_with("job_"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.counters.total, 3);
        assert_eq!(job.counters.reported(), 0);
        assert_eq!(job.specifications.len(), 3);
    }

    #[test]
    fn test_get_by_public_id() {
        let store = create_test_store();
        let job = store.create(create_test_request(1)).unwrap();

        let by_id = store.get(&job.id).unwrap().unwrap();
        let by_public = store.get(&job.public_id).unwrap().unwrap();
        assert_eq!(by_id.id, by_public.id);
        assert_eq!(by_public.specifications[0].description, "artifact 0");

        assert!(store.get("job_missing").unwrap().is_none());
    }

    #[test]
    fn test_counter_lifecycle() {
        let store = create_test_store();
        let job = store.create(create_test_request(2)).unwrap();

        store.apply_counter(&job.id, CounterDelta::Started).unwrap();
        let counters = store.apply_counter(&job.id, CounterDelta::Started).unwrap();
        assert_eq!(counters.in_progress, 2);

        let counters = store.apply_counter(&job.id, CounterDelta::Succeeded).unwrap();
        assert_eq!(counters.completed, 1);
        assert_eq!(counters.in_progress, 1);

        let counters = store.apply_counter(&job.id, CounterDelta::Failed).unwrap();
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.in_progress, 0);
        assert!(counters.is_done());
    }

    #[test]
    fn test_started_cannot_exceed_total() {
        let store = create_test_store();
        let job = store.create(create_test_request(1)).unwrap();

        store.apply_counter(&job.id, CounterDelta::Started).unwrap();
        let result = store.apply_counter(&job.id, CounterDelta::Started);
        assert!(matches!(result, Err(JobError::CounterRejected { .. })));
    }

    #[test]
    fn test_outcome_without_start_rejected() {
        let store = create_test_store();
        let job = store.create(create_test_request(1)).unwrap();

        let result = store.apply_counter(&job.id, CounterDelta::Succeeded);
        assert!(matches!(result, Err(JobError::CounterRejected { .. })));

        let job = store.get(&job.id).unwrap().unwrap();
        assert_eq!(job.counters.completed, 0);
    }

    #[test]
    fn test_counter_on_missing_job() {
        let store = create_test_store();
        let result = store.apply_counter("nope", CounterDelta::Started);
        assert!(matches!(result, Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_try_complete_is_idempotent() {
        let store = create_test_store();
        let job = store.create(create_test_request(1)).unwrap();
        store
            .update_status(&job.id, JobStatus::Processing, None)
            .unwrap();

        // Not done yet
        assert!(!store.try_complete(&job.id).unwrap());

        store.apply_counter(&job.id, CounterDelta::Started).unwrap();
        store.apply_counter(&job.id, CounterDelta::Succeeded).unwrap();

        assert!(store.try_complete(&job.id).unwrap());
        assert!(!store.try_complete(&job.id).unwrap());

        let job = store.get(&job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_empty_job_never_completes() {
        let store = create_test_store();
        let job = store.create(create_test_request(0)).unwrap();
        assert!(!store.try_complete(&job.id).unwrap());
        assert_eq!(
            store.get(&job.id).unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[test]
    fn test_update_status_rejects_terminal() {
        let store = create_test_store();
        let job = store.create(create_test_request(1)).unwrap();

        let failed = store
            .update_status(&job.id, JobStatus::Failed, Some("boom".to_string()))
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));

        let result = store.update_status(&job.id, JobStatus::Processing, None);
        assert!(matches!(result, Err(JobError::InvalidState { .. })));
    }

    #[test]
    fn test_update_status_cannot_force_completion() {
        let store = create_test_store();
        let job = store.create(create_test_request(1)).unwrap();
        let result = store.update_status(&job.id, JobStatus::Completed, None);
        assert!(matches!(result, Err(JobError::InvalidState { .. })));
    }

    #[test]
    fn test_list_and_count_with_filters() {
        let store = create_test_store();
        let a = store.create(create_test_request(1)).unwrap();
        store
            .create(CreateJobRequest {
                owner: "someone-else".to_string(),
                specifications: vec![Specification::new("x")],
            })
            .unwrap();
        store
            .update_status(&a.id, JobStatus::Processing, None)
            .unwrap();

        assert_eq!(store.count(&JobFilter::new()).unwrap(), 2);
        assert_eq!(
            store
                .count(&JobFilter::new().with_owner("test-user"))
                .unwrap(),
            1
        );

        let processing = store
            .list(&JobFilter::new().with_status(JobStatus::Processing))
            .unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, a.id);

        let page = store.list(&JobFilter::new().with_limit(1)).unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("jobs.db");

        let id = {
            let store = SqliteJobStore::new(&db_path).unwrap();
            store.create(create_test_request(2)).unwrap().id
        };

        let store = SqliteJobStore::new(&db_path).unwrap();
        let job = store.get(&id).unwrap().unwrap();
        assert_eq!(job.counters.total, 2);
    }
}
