//! SQLite-backed task store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    new_public_task_id, CreateTaskRequest, OutcomeRef, Task, TaskError, TaskFilter, TaskStatus,
    TaskStore,
};
use crate::db;
use crate::outcome::FailureCategory;
use crate::stages::Specification;

const TASK_COLUMNS: &str = "id, public_id, job_id, specification, status, iteration, artifact_id, failure_id, error_category, error_message, created_at, updated_at, completed_at";

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Create a new SQLite task store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TaskError> {
        let conn = db::open(path).map_err(|e| TaskError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite task store (useful for testing).
    pub fn in_memory() -> Result<Self, TaskError> {
        let conn = db::open_in_memory().map_err(|e| TaskError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                public_id TEXT NOT NULL UNIQUE,
                job_id TEXT NOT NULL,
                specification TEXT NOT NULL,
                status TEXT NOT NULL,
                iteration INTEGER NOT NULL DEFAULT 0,
                artifact_id TEXT,
                failure_id TEXT,
                error_category TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                CHECK (artifact_id IS NULL OR failure_id IS NULL)
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_job_id ON tasks(job_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            "#,
        )
        .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.conn
            .lock()
            .map_err(|_| TaskError::Database("task store lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &TaskFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref job_id) = filter.job_id {
            conditions.push("job_id = ?");
            params.push(Box::new(job_id.clone()));
        }

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let specification_json: String = row.get(3)?;
        let status_str: String = row.get(4)?;
        let artifact_id: Option<String> = row.get(6)?;
        let failure_id: Option<String> = row.get(7)?;
        let error_category: Option<String> = row.get(8)?;
        let error_message: Option<String> = row.get(9)?;
        let created_at: String = row.get(10)?;
        let updated_at: String = row.get(11)?;

        let outcome = match (artifact_id, failure_id) {
            (Some(artifact_id), _) => Some(OutcomeRef::Success { artifact_id }),
            (None, Some(failure_id)) => Some(OutcomeRef::Failure {
                failure_id,
                category: error_category
                    .as_deref()
                    .and_then(FailureCategory::parse)
                    .unwrap_or(FailureCategory::InternalError),
                message: error_message.unwrap_or_default(),
            }),
            (None, None) => error_category
                .as_deref()
                .and_then(FailureCategory::parse)
                .map(|category| OutcomeRef::Unrecorded {
                    category,
                    message: error_message.unwrap_or_default(),
                }),
        };

        Ok(Task {
            id: row.get(0)?,
            public_id: row.get(1)?,
            job_id: row.get(2)?,
            specification: serde_json::from_str(&specification_json)
                .unwrap_or_else(|_| Specification::new("")),
            status: TaskStatus::parse(&status_str).unwrap_or(TaskStatus::Failed),
            iteration: row.get(5)?,
            outcome,
            created_at: db::parse_timestamp(&created_at),
            updated_at: db::parse_timestamp(&updated_at),
            completed_at: db::parse_optional_timestamp(row.get(12)?),
        })
    }

    fn get_with(conn: &Connection, id: &str) -> Result<Option<Task>, TaskError> {
        conn.query_row(
            &format!(
                "SELECT {} FROM tasks WHERE id = ?1 OR public_id = ?1",
                TASK_COLUMNS
            ),
            params![id],
            Self::row_to_task,
        )
        .optional()
        .map_err(|e| TaskError::Database(e.to_string()))
    }

    /// Explain why a guarded write touched no rows.
    fn rejection(conn: &Connection, id: &str, operation: &str) -> TaskError {
        match Self::get_with(conn, id) {
            Ok(Some(task)) => TaskError::InvalidState {
                task_id: task.id,
                current_status: task.status.as_str().to_string(),
                operation: operation.to_string(),
            },
            Ok(None) => TaskError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, request: CreateTaskRequest) -> Result<Task, TaskError> {
        let conn = self.lock()?;

        let id = uuid::Uuid::new_v4().to_string();
        let public_id = new_public_task_id();
        let now = Utc::now();

        let specification_json = serde_json::to_string(&request.specification)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO tasks (id, public_id, job_id, specification, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                public_id,
                request.job_id,
                specification_json,
                TaskStatus::Pending.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| TaskError::Database(e.to_string()))?;

        Ok(Task {
            id,
            public_id,
            job_id: request.job_id,
            specification: request.specification,
            status: TaskStatus::Pending,
            iteration: 0,
            outcome: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Task>, TaskError> {
        let conn = self.lock()?;
        Self::get_with(&conn, id)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM tasks {} ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            TASK_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_task)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn count(&self, filter: &TaskFilter) -> Result<i64, TaskError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM tasks {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn update_status(&self, id: &str, status: TaskStatus) -> Result<Task, TaskError> {
        let conn = self.lock()?;
        let operation = format!("move to {}", status.as_str());

        if status.is_terminal() {
            return Err(Self::rejection(&conn, id, &operation));
        }

        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 \
                 WHERE (id = ?3 OR public_id = ?3) AND status NOT IN ('completed', 'failed')",
                params![status.as_str(), Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| TaskError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(Self::rejection(&conn, id, &operation));
        }

        Self::get_with(&conn, id)?.ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    fn set_iteration(&self, id: &str, iteration: u32) -> Result<(), TaskError> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE tasks SET iteration = ?1, updated_at = ?2 \
                 WHERE (id = ?3 OR public_id = ?3) AND status NOT IN ('completed', 'failed')",
                params![iteration, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| TaskError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(Self::rejection(&conn, id, "set iteration of"));
        }
        Ok(())
    }

    fn set_outcome(&self, id: &str, outcome: OutcomeRef) -> Result<Task, TaskError> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let status = outcome.terminal_status();

        let (artifact_id, failure_id, category, message) = match &outcome {
            OutcomeRef::Success { artifact_id } => (Some(artifact_id.as_str()), None, None, None),
            OutcomeRef::Failure {
                failure_id,
                category,
                message,
            } => (
                None,
                Some(failure_id.as_str()),
                Some(category.as_str()),
                Some(message.as_str()),
            ),
            OutcomeRef::Unrecorded { category, message } => {
                (None, None, Some(category.as_str()), Some(message.as_str()))
            }
        };

        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?1, artifact_id = ?2, failure_id = ?3, error_category = ?4, \
                 error_message = ?5, updated_at = ?6, completed_at = ?6 \
                 WHERE (id = ?7 OR public_id = ?7) AND status NOT IN ('completed', 'failed') \
                 AND artifact_id IS NULL AND failure_id IS NULL",
                params![status.as_str(), artifact_id, failure_id, category, message, now, id],
            )
            .map_err(|e| TaskError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(Self::rejection(&conn, id, "set outcome of"));
        }

        Self::get_with(&conn, id)?.ok_or_else(|| TaskError::NotFound(id.to_string()))
    }
}
