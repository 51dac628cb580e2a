//! Per-author sync status records
//!
//! One row per author, written as a full upsert on every transition.
//! `retry_count` only ever grows; a successful sync does not reset it, so
//! the row keeps a lifetime view of how often reconciliation has failed.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::types::Result;

use super::sqlite::{opt_ts, CacheDb};

/// Reconciliation state for one author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Syncing => "SYNCING",
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Failed => "FAILED",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "PENDING" => Some(SyncStatus::Pending),
            "SYNCING" => Some(SyncStatus::Syncing),
            "COMPLETED" => Some(SyncStatus::Completed),
            "FAILED" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

/// Durable record of the last reconciliation attempt for an author.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusRecord {
    pub author_id: String,
    pub status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<SyncStatusRecord> {
    let status_text: String = row.get(1)?;
    let status = SyncStatus::parse(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown sync status {status_text:?}").into(),
        )
    })?;

    Ok(SyncStatusRecord {
        author_id: row.get(0)?,
        status,
        last_synced_at: opt_ts(row, 2)?,
        error_message: row.get(3)?,
        retry_count: row.get::<_, i64>(4)? as u32,
    })
}

impl CacheDb {
    pub async fn sync_status(&self, author_id: &str) -> Result<Option<SyncStatusRecord>> {
        let author_id = author_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT author_id, status, last_synced_at, error_message, retry_count
                 FROM sync_status WHERE author_id = ?1",
                params![author_id],
                record_from_row,
            )
            .optional()
        })
        .await
    }

    /// Enter SYNCING, clearing any previous error. Creates the record on
    /// the first attempt; preserves `last_synced_at` and `retry_count`.
    pub async fn set_sync_syncing(&self, author_id: &str) -> Result<()> {
        let author_id = author_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_status (author_id, status, error_message)
                 VALUES (?1, 'SYNCING', NULL)
                 ON CONFLICT(author_id) DO UPDATE SET
                     status = 'SYNCING',
                     error_message = NULL",
                params![author_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_sync_completed(&self, author_id: &str, at: DateTime<Utc>) -> Result<()> {
        let author_id = author_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_status (author_id, status, last_synced_at, error_message)
                 VALUES (?1, 'COMPLETED', ?2, NULL)
                 ON CONFLICT(author_id) DO UPDATE SET
                     status = 'COMPLETED',
                     last_synced_at = excluded.last_synced_at,
                     error_message = NULL",
                params![author_id, at.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    /// Record a failed attempt and bump the retry counter.
    pub async fn set_sync_failed(&self, author_id: &str, error: &str) -> Result<()> {
        let author_id = author_id.to_string();
        let error = error.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_status (author_id, status, error_message, retry_count)
                 VALUES (?1, 'FAILED', ?2, 1)
                 ON CONFLICT(author_id) DO UPDATE SET
                     status = 'FAILED',
                     error_message = excluded.error_message,
                     retry_count = sync_status.retry_count + 1",
                params![author_id, error],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_trigger_creates_a_syncing_record() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.sync_status("a1").await.unwrap().is_none());

        db.set_sync_syncing("a1").await.unwrap();
        let record = db.sync_status("a1").await.unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Syncing);
        assert_eq!(record.retry_count, 0);
        assert!(record.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn failure_bumps_retry_count_and_completion_keeps_it() {
        let db = CacheDb::open_in_memory().await.unwrap();

        db.set_sync_syncing("a1").await.unwrap();
        db.set_sync_failed("a1", "ledger unreachable").await.unwrap();
        db.set_sync_syncing("a1").await.unwrap();
        db.set_sync_failed("a1", "still unreachable").await.unwrap();

        let record = db.sync_status("a1").await.unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Failed);
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.error_message.as_deref(), Some("still unreachable"));

        let now = Utc::now();
        db.set_sync_completed("a1", now).await.unwrap();
        let record = db.sync_status("a1").await.unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Completed);
        assert!(record.error_message.is_none());
        // Completion does not reset the lifetime failure counter.
        assert_eq!(record.retry_count, 2);
    }

    #[tokio::test]
    async fn re_entering_syncing_clears_the_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set_sync_failed("a1", "boom").await.unwrap();
        db.set_sync_syncing("a1").await.unwrap();

        let record = db.sync_status("a1").await.unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Syncing);
        assert!(record.error_message.is_none());
        assert_eq!(record.retry_count, 1);
    }
}
