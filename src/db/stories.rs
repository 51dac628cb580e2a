//! Cached story rows
//!
//! A row mirrors one ledger story. The primary key IS the ledger id; a
//! story must never be cached under a locally generated id, or cache and
//! ledger identity drift apart. Content bodies are not stored here - they
//! are fetched through the pinning client when a detail read asks for
//! them.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::types::Result;

use super::sqlite::{ts, CacheDb};

/// Denormalized story record, refreshed on every reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedStory {
    /// Ledger-assigned story id.
    pub id: u64,
    pub author_id: String,
    pub title: String,
    pub description: String,
    pub content_address: String,
    pub cover_address: Option<String>,
    pub chapter_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    /// When this row was last refreshed from the ledger.
    pub synced_at: DateTime<Utc>,
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<CachedStory> {
    Ok(CachedStory {
        id: row.get::<_, i64>(0)? as u64,
        author_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        content_address: row.get(4)?,
        cover_address: row.get(5)?,
        chapter_count: row.get::<_, i64>(6)? as u32,
        created_at: ts(row, 7)?,
        last_update: ts(row, 8)?,
        synced_at: ts(row, 9)?,
    })
}

const STORY_COLUMNS: &str = "id, author_id, title, description, content_address, cover_address,
     chapter_count, created_at, last_update, synced_at";

impl CacheDb {
    /// Insert or refresh a story row, keyed by its ledger id.
    pub async fn upsert_story(&self, story: CachedStory) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO stories (id, author_id, title, description, content_address,
                                      cover_address, chapter_count, created_at, last_update, synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     author_id       = excluded.author_id,
                     title           = excluded.title,
                     description     = excluded.description,
                     content_address = excluded.content_address,
                     cover_address   = excluded.cover_address,
                     chapter_count   = excluded.chapter_count,
                     created_at      = excluded.created_at,
                     last_update     = excluded.last_update,
                     synced_at       = excluded.synced_at",
                params![
                    story.id as i64,
                    story.author_id,
                    story.title,
                    story.description,
                    story.content_address,
                    story.cover_address,
                    story.chapter_count as i64,
                    story.created_at.to_rfc3339(),
                    story.last_update.to_rfc3339(),
                    story.synced_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn story(&self, id: u64) -> Result<Option<CachedStory>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = ?1"),
                params![id as i64],
                story_from_row,
            )
            .optional()
        })
        .await
    }

    pub async fn stories_by_author(&self, author_id: &str) -> Result<Vec<CachedStory>> {
        let author_id = author_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STORY_COLUMNS} FROM stories WHERE author_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![author_id], story_from_row)?;
            rows.collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: u64, author_id: &str, title: &str) -> CachedStory {
        let now = Utc::now();
        CachedStory {
            id,
            author_id: author_id.to_string(),
            title: title.to_string(),
            description: "a serial".to_string(),
            content_address: format!("bafycontent{id}"),
            cover_address: None,
            chapter_count: 1,
            created_at: now,
            last_update: now,
            synced_at: now,
        }
    }

    #[tokio::test]
    async fn upsert_refreshes_existing_row() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_story(story(7, "a1", "First Title")).await.unwrap();

        let mut updated = story(7, "a1", "Retitled");
        updated.chapter_count = 5;
        db.upsert_story(updated).await.unwrap();

        let found = db.story(7).await.unwrap().unwrap();
        assert_eq!(found.title, "Retitled");
        assert_eq!(found.chapter_count, 5);

        // Still one row: the ledger id is the identity.
        assert_eq!(db.stories_by_author("a1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lists_only_the_requested_author() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.upsert_story(story(1, "a1", "Mine")).await.unwrap();
        db.upsert_story(story(2, "a2", "Theirs")).await.unwrap();
        db.upsert_story(story(3, "a1", "Also Mine")).await.unwrap();

        let mine = db.stories_by_author("a1").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, 1);
        assert_eq!(mine[1].id, 3);
    }
}
