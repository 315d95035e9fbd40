use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use super::{ProgressError, ProgressEvent, ProgressFilter, ProgressRecord, ProgressStore};
use crate::db;

/// SQLite-backed progress event store
pub struct SqliteProgressStore {
    conn: Mutex<Connection>,
}

impl SqliteProgressStore {
    /// Create a new SQLite progress store, creating the database file and tables if needed
    pub fn new(path: &Path) -> Result<Self, ProgressError> {
        let conn = db::open(path).map_err(|e| ProgressError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite progress store (useful for testing)
    pub fn in_memory() -> Result<Self, ProgressError> {
        let conn = db::open_in_memory().map_err(|e| ProgressError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ProgressError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS progress_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                job_id TEXT,
                task_id TEXT,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_progress_events_job_id ON progress_events(job_id);
            CREATE INDEX IF NOT EXISTS idx_progress_events_task_id ON progress_events(task_id);
            CREATE INDEX IF NOT EXISTS idx_progress_events_event_type ON progress_events(event_type);
            "#,
        )
        .map_err(|e| ProgressError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ProgressError> {
        self.conn
            .lock()
            .map_err(|_| ProgressError::Database("progress store lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &ProgressFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref job_id) = filter.job_id {
            conditions.push("job_id = ?");
            params.push(Box::new(job_id.clone()));
        }

        if let Some(ref task_id) = filter.task_id {
            conditions.push("task_id = ?");
            params.push(Box::new(task_id.clone()));
        }

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl ProgressStore for SqliteProgressStore {
    fn insert(&self, record: &ProgressRecord) -> Result<i64, ProgressError> {
        let conn = self.lock()?;

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| ProgressError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO progress_events (timestamp, event_type, job_id, task_id, data) VALUES (?, ?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.job_id,
                record.task_id,
                data_json,
            ],
        )
        .map_err(|e| ProgressError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &ProgressFilter) -> Result<Vec<ProgressRecord>, ProgressError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, timestamp, event_type, job_id, task_id, data FROM progress_events {} ORDER BY id ASC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ProgressError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| ProgressError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            let (id, timestamp, event_type, job_id, task_id, data_json) =
                row_result.map_err(|e| ProgressError::Database(e.to_string()))?;

            let data: ProgressEvent = serde_json::from_str(&data_json)
                .map_err(|e| ProgressError::Serialization(e.to_string()))?;

            records.push(ProgressRecord {
                id,
                timestamp: db::parse_timestamp(&timestamp),
                event_type,
                job_id,
                task_id,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &ProgressFilter) -> Result<i64, ProgressError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM progress_events {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| ProgressError::Database(e.to_string()))
    }
}
