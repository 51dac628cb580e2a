//! SQLite connection wrapper
//!
//! One connection guarded by a mutex; statements run on the blocking
//! thread pool so database work never parks the async executor.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::types::{Result, StorygateError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS authors (
    id             TEXT PRIMARY KEY,
    wallet_address TEXT NOT NULL UNIQUE,
    pen_name       TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stories (
    id              INTEGER PRIMARY KEY,
    author_id       TEXT NOT NULL,
    title           TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    content_address TEXT NOT NULL,
    cover_address   TEXT,
    chapter_count   INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    last_update     TEXT NOT NULL,
    synced_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stories_author ON stories (author_id);

CREATE TABLE IF NOT EXISTS sync_status (
    author_id      TEXT PRIMARY KEY,
    status         TEXT NOT NULL,
    last_synced_at TEXT,
    error_message  TEXT,
    retry_count    INTEGER NOT NULL DEFAULT 0
);
";

/// Handle to the story cache database.
#[derive(Clone)]
pub struct CacheDb {
    conn: Arc<Mutex<Connection>>,
}

impl CacheDb {
    /// Open (or create) the cache at `path` and apply the schema.
    pub async fn open(path: &str) -> Result<Self> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StorygateError::Internal(format!("database open task failed: {e}")))??;

        info!("Story cache database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory cache, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| -> rusqlite::Result<Connection> {
            let conn = Connection::open_in_memory()?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StorygateError::Internal(format!("database open task failed: {e}")))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a statement batch on the blocking pool.
    pub(crate) async fn with_conn<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&lock(&conn)))
            .await
            .map_err(|e| StorygateError::Internal(format!("database task failed: {e}")))?
            .map_err(Into::into)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

fn lock(conn: &Arc<Mutex<Connection>>) -> MutexGuard<'_, Connection> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Read an RFC 3339 timestamp column.
pub(crate) fn ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_ts(&text, idx)
}

/// Read a nullable RFC 3339 timestamp column.
pub(crate) fn opt_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_ts(&t, idx)).transpose()
}

fn parse_ts(text: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reopens_an_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db").to_string_lossy().to_string();

        {
            let db = CacheDb::open(&path).await.unwrap();
            db.set_sync_failed("a1", "first failure").await.unwrap();
        }

        let db = CacheDb::open(&path).await.unwrap();
        let record = db.sync_status("a1").await.unwrap().unwrap();
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.error_message.as_deref(), Some("first failure"));
    }
}
