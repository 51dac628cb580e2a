//! Typed read client for the story ledger
//!
//! The contract surface we consume is two read calls: list the story ids
//! owned by an address, and read one story's authoritative fields. The
//! trait is the seam the reconciliation engine is written against;
//! `JsonRpcLedger` is the production implementation, with a lazily
//! established provider handle that is re-probed after a failed call.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::types::{Result, StorygateError};

use super::provider::{connect_provider, rpc_call, ProviderHandle};

/// Authoritative story fields as recorded on the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStory {
    pub id: u64,
    pub title: String,
    pub content_address: String,
    #[serde(default)]
    pub cover_address: Option<String>,
    #[serde(default)]
    pub chapter_count: u32,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub last_update: i64,
}

/// Typed read calls against the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// List the ids of every story owned by `owner_address`, in ledger order.
    async fn list_story_ids(&self, owner_address: &str) -> Result<Vec<u64>>;

    /// Read one story's authoritative fields.
    async fn read_story(&self, story_id: u64) -> Result<LedgerStory>;
}

/// JSON-RPC implementation over the provider fallback.
pub struct JsonRpcLedger {
    client: reqwest::Client,
    endpoints: Vec<String>,
    probe_timeout: Duration,
    call_timeout: Duration,
    /// The live provider handle (lazily established).
    provider: RwLock<Option<ProviderHandle>>,
    /// Serializes concurrent probe attempts.
    connecting: Mutex<()>,
}

impl JsonRpcLedger {
    pub fn new(
        client: reqwest::Client,
        endpoints: Vec<String>,
        probe_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoints,
            probe_timeout,
            call_timeout,
            provider: RwLock::new(None),
            connecting: Mutex::new(()),
        }
    }

    /// Get or establish the provider handle.
    async fn provider(&self) -> Result<ProviderHandle> {
        // Fast path: an endpoint already passed the probe.
        {
            let provider = self.provider.read().await;
            if let Some(ref handle) = *provider {
                return Ok(handle.clone());
            }
        }

        let _lock = self.connecting.lock().await;

        // Double-check after acquiring the lock.
        {
            let provider = self.provider.read().await;
            if let Some(ref handle) = *provider {
                return Ok(handle.clone());
            }
        }

        let handle = connect_provider(&self.client, &self.endpoints, self.probe_timeout).await?;
        info!(endpoint = %handle.endpoint, "Ledger provider established");

        {
            let mut provider = self.provider.write().await;
            *provider = Some(handle.clone());
        }

        Ok(handle)
    }

    /// Drop the cached handle so the next call re-probes the fallback list.
    async fn invalidate(&self) {
        let mut provider = self.provider.write().await;
        *provider = None;
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let handle = self.provider().await?;
        match rpc_call(
            &self.client,
            &handle.endpoint,
            method,
            params,
            self.call_timeout,
        )
        .await
        {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(endpoint = %handle.endpoint, method, error = %e, "Ledger call failed, dropping provider");
                self.invalidate().await;
                Err(StorygateError::Ledger(e))
            }
        }
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn list_story_ids(&self, owner_address: &str) -> Result<Vec<u64>> {
        let result = self.call("story_listByOwner", json!([owner_address])).await?;
        serde_json::from_value(result)
            .map_err(|e| StorygateError::Ledger(format!("unexpected story id list: {e}")))
    }

    async fn read_story(&self, story_id: u64) -> Result<LedgerStory> {
        let result = self.call("story_getById", json!([story_id])).await?;
        serde_json::from_value(result)
            .map_err(|e| StorygateError::Ledger(format!("unexpected story record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_story_deserializes_with_optional_fields() {
        let record: LedgerStory = serde_json::from_value(json!({
            "id": 7,
            "title": "The Lighthouse Serial",
            "content_address": "bafyabc",
            "created_at": 1700000000,
            "last_update": 1700003600,
        }))
        .unwrap();

        assert_eq!(record.id, 7);
        assert_eq!(record.cover_address, None);
        assert_eq!(record.chapter_count, 0);
    }
}
