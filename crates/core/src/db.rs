//! Shared SQLite helpers for the store implementations.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// How long a connection waits for a lock held by another connection to the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a file-backed connection configured for several stores sharing one database.
pub(crate) fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    Ok(conn)
}

pub(crate) fn open_in_memory() -> rusqlite::Result<Connection> {
    Connection::open_in_memory()
}

/// Parse an RFC 3339 column, falling back to now for corrupt values.
pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_optional_timestamp(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_timestamp)
}
