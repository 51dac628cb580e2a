//! Reconciliation engine
//!
//! `trigger_sync` is idempotent and non-blocking: it flips the author's
//! status record to SYNCING and hands the actual pull-resolve-merge cycle
//! to a supervised background task. Concurrent triggers for the same
//! author coalesce into the single in-flight run; different authors sync
//! independently, bounded by a semaphore.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::db::{Author, CacheDb, CachedStory, SyncStatusRecord};
use crate::ledger::LedgerClient;
use crate::pinning::{PinningClient, StoreTransport};
use crate::types::{Result, StorygateError};

use super::StoryContent;

#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Maximum reconciliations running at the same time.
    pub max_concurrent_syncs: usize,
    /// Preview length used when synthesizing a record from raw content.
    pub preview_chars: usize,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_syncs: 4,
            preview_chars: 200,
        }
    }
}

/// Keeps the relational cache consistent with ledger and store.
pub struct SyncEngine<L: LedgerClient, T: StoreTransport> {
    config: SyncEngineConfig,
    db: CacheDb,
    ledger: Arc<L>,
    store: Arc<PinningClient<T>>,
    /// Authors with a reconciliation currently in flight.
    inflight: DashMap<String, ()>,
    permits: Arc<Semaphore>,
}

impl<L: LedgerClient + 'static, T: StoreTransport + 'static> SyncEngine<L, T> {
    pub fn new(
        config: SyncEngineConfig,
        db: CacheDb,
        ledger: Arc<L>,
        store: Arc<PinningClient<T>>,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_syncs));
        Arc::new(Self {
            config,
            db,
            ledger,
            store,
            inflight: DashMap::new(),
            permits,
        })
    }

    /// Current status record for an author, if any sync was ever attempted.
    pub async fn sync_state(&self, author_id: &str) -> Result<Option<SyncStatusRecord>> {
        self.db.sync_status(author_id).await
    }

    /// Begin a sync attempt for an author and return immediately.
    ///
    /// If a reconciliation for this author is already in flight the call
    /// coalesces into it. The only synchronous failure is being unable to
    /// record the SYNCING transition; everything later lands on the status
    /// record instead of any caller.
    pub async fn trigger_sync(self: &Arc<Self>, author_id: &str) -> Result<()> {
        match self.inflight.entry(author_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(author_id, "Sync already in flight, coalescing");
                return Ok(());
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        if let Err(e) = self.db.set_sync_syncing(author_id).await {
            self.inflight.remove(author_id);
            return Err(e);
        }

        let engine = Arc::clone(self);
        let owner = author_id.to_string();
        tokio::spawn(async move {
            engine.run_supervised(owner).await;
        });

        Ok(())
    }

    /// Supervision wrapper: bounded concurrency, panic capture, and a
    /// guaranteed status-record write on any failure.
    async fn run_supervised(self: Arc<Self>, author_id: String) {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.inflight.remove(&author_id);
                return;
            }
        };

        match AssertUnwindSafe(self.reconcile(&author_id)).catch_unwind().await {
            Ok(Ok(resolved)) => {
                info!(author_id = %author_id, resolved, "Reconciliation completed");
            }
            Ok(Err(e)) => {
                error!(author_id = %author_id, error = %e, "Reconciliation failed");
                self.record_failure(&author_id, &e.to_string()).await;
            }
            Err(_) => {
                error!(author_id = %author_id, "Reconciliation panicked");
                self.record_failure(&author_id, "internal error during reconciliation")
                    .await;
            }
        }

        self.inflight.remove(&author_id);
    }

    async fn record_failure(&self, author_id: &str, message: &str) {
        if let Err(e) = self.db.set_sync_failed(author_id, message).await {
            error!(author_id = %author_id, error = %e, "Failed to record sync failure");
        }
    }

    /// One pull-resolve-merge cycle. Returns how many stories resolved.
    async fn reconcile(&self, author_id: &str) -> Result<usize> {
        let author = self.db.author(author_id).await?.ok_or_else(|| {
            StorygateError::NotFound(format!("author {author_id} is not registered"))
        })?;

        let story_ids = self.ledger.list_story_ids(&author.wallet_address).await?;
        info!(
            author_id,
            wallet = %author.wallet_address,
            stories = story_ids.len(),
            "Fetched ledger story listing"
        );

        let mut resolved = 0usize;
        for story_id in story_ids {
            match self.resolve_story(&author, story_id).await {
                Ok(()) => resolved += 1,
                Err(e) => {
                    warn!(author_id, story_id, error = %e, "Skipping story after resolution failure");
                }
            }
        }

        if resolved == 0 {
            return Err(StorygateError::Ledger(format!(
                "no stories resolved for author {author_id}"
            )));
        }

        self.db.set_sync_completed(author_id, Utc::now()).await?;
        Ok(resolved)
    }

    /// Resolve one story: authoritative fields from the ledger, content
    /// through the store, upsert keyed by the ledger id.
    async fn resolve_story(&self, author: &Author, story_id: u64) -> Result<()> {
        let record = self.ledger.read_story(story_id).await?;
        let raw = self.store.get_text(&record.content_address).await?;

        let content = match serde_json::from_str::<StoryContent>(&raw) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    story_id,
                    address = %record.content_address,
                    error = %e,
                    "Content payload not in expected shape; synthesizing preview"
                );
                StoryContent::preview_of(&raw, self.config.preview_chars)
            }
        };

        self.db
            .upsert_story(CachedStory {
                id: record.id,
                author_id: author.id.clone(),
                title: record.title,
                description: content.description,
                content_address: record.content_address,
                cover_address: record.cover_address,
                chapter_count: record.chapter_count,
                created_at: from_unix(record.created_at),
                last_update: from_unix(record.last_update),
                synced_at: Utc::now(),
            })
            .await
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
