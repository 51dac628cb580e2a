//! Story read API
//!
//! The read path never blocks on external systems: a stale or absent sync
//! record fires a background reconciliation and the response carries
//! whatever the cache holds right now, annotated with the sync status so
//! callers can tell fresh data from data still on its way.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::db::{Author, CacheDb, CachedStory, SyncStatus, SyncStatusRecord};
use crate::ledger::LedgerClient;
use crate::pinning::{PinningClient, StoreTransport};
use crate::sync::SyncEngine;
use crate::types::{Result, StorygateError};

/// Response for "list stories for author".
#[derive(Debug, Serialize)]
pub struct StoriesResponse {
    pub stories: Vec<CachedStory>,
    pub total: usize,
    #[serde(rename = "syncStatus")]
    pub sync_status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Story detail with lazily fetched content.
#[derive(Debug, Serialize)]
pub struct StoryDetailResponse {
    #[serde(flatten)]
    pub story: CachedStory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Set when the content fetch failed and the response degraded to
    /// metadata only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAuthorRequest {
    pub wallet_address: String,
    pub pen_name: String,
}

#[derive(Debug, Serialize)]
pub struct SyncTriggerResponse {
    #[serde(rename = "syncStatus")]
    pub sync_status: SyncStatus,
    pub message: String,
}

/// List an author's cached stories, kicking off a background sync when the
/// cache is not known to be fresh.
pub async fn author_stories<L, T>(
    db: &CacheDb,
    engine: &Arc<SyncEngine<L, T>>,
    author_id: &str,
) -> Result<StoriesResponse>
where
    L: LedgerClient + 'static,
    T: StoreTransport + 'static,
{
    let record = db.sync_status(author_id).await?;
    let status = record
        .as_ref()
        .map(|r| r.status)
        .unwrap_or(SyncStatus::Pending);

    if status != SyncStatus::Completed {
        if let Err(e) = engine.trigger_sync(author_id).await {
            warn!(author_id, error = %e, "Failed to trigger background sync");
        }
    }

    let stories = db.stories_by_author(author_id).await?;
    let total = stories.len();

    let (message, error) = match status {
        SyncStatus::Completed => (None, None),
        SyncStatus::Pending => (
            Some("First sync scheduled; stories may appear shortly.".to_string()),
            None,
        ),
        SyncStatus::Syncing => (
            Some("Sync in progress; results may be incomplete.".to_string()),
            None,
        ),
        SyncStatus::Failed => (
            Some("Last sync failed; retrying in the background.".to_string()),
            record.and_then(|r| r.error_message),
        ),
    };

    Ok(StoriesResponse {
        stories,
        total,
        sync_status: status,
        message,
        error,
    })
}

/// Fetch one story with its content body resolved through the store.
///
/// A store failure degrades to metadata-only rather than failing the read.
pub async fn story_detail<T>(
    db: &CacheDb,
    store: &PinningClient<T>,
    story_id: u64,
) -> Result<StoryDetailResponse>
where
    T: StoreTransport + 'static,
{
    let story = db
        .story(story_id)
        .await?
        .ok_or_else(|| StorygateError::NotFound(format!("story {story_id}")))?;

    let (content, content_error) = match store.get_text(&story.content_address).await {
        Ok(content) => (Some(content), None),
        Err(e) => {
            warn!(story_id, error = %e, "Content fetch failed, serving metadata only");
            (None, Some(e.to_string()))
        }
    };

    Ok(StoryDetailResponse {
        story,
        content,
        content_error,
    })
}

/// Register a new author in the local registry.
pub async fn register_author(db: &CacheDb, request: RegisterAuthorRequest) -> Result<Author> {
    let author = Author {
        id: Uuid::new_v4().to_string(),
        wallet_address: request.wallet_address,
        pen_name: request.pen_name,
        created_at: Utc::now(),
    };
    db.insert_author(author.clone()).await?;
    Ok(author)
}

/// Explicitly begin a sync for an author.
pub async fn trigger_author_sync<L, T>(
    engine: &Arc<SyncEngine<L, T>>,
    author_id: &str,
) -> Result<SyncTriggerResponse>
where
    L: LedgerClient + 'static,
    T: StoreTransport + 'static,
{
    engine.trigger_sync(author_id).await?;
    Ok(SyncTriggerResponse {
        sync_status: SyncStatus::Syncing,
        message: format!("Sync started for author {author_id}"),
    })
}

/// Current sync record; an author that was never synced reports PENDING.
pub async fn author_sync_state<L, T>(
    engine: &Arc<SyncEngine<L, T>>,
    author_id: &str,
) -> Result<SyncStatusRecord>
where
    L: LedgerClient + 'static,
    T: StoreTransport + 'static,
{
    Ok(engine
        .sync_state(author_id)
        .await?
        .unwrap_or(SyncStatusRecord {
            author_id: author_id.to_string(),
            status: SyncStatus::Pending,
            last_synced_at: None,
            error_message: None,
            retry_count: 0,
        }))
}
