//! Configuration for Storygate
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::credentials::StoreCredential;

/// Storygate - sync gateway for serialized stories
///
/// Keeps a relational cache consistent with the story ledger and the
/// content-addressed pinning store.
#[derive(Parser, Debug, Clone)]
#[command(name = "storygate")]
#[command(about = "Sync gateway for ledger-published serialized stories")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// SQLite database path for the story cache
    #[arg(long, env = "DATABASE_PATH", default_value = "storygate.db")]
    pub database_path: String,

    /// Pinning service API base URL (authenticated writes)
    #[arg(long, env = "PINNING_API_URL", default_value = "https://api.pinata.cloud")]
    pub pinning_api_url: String,

    /// Public content gateway base URL (bearer-authenticated reads)
    #[arg(long, env = "PINNING_GATEWAY_URL", default_value = "https://gateway.pinata.cloud")]
    pub pinning_gateway_url: String,

    /// Pinning credentials, comma separated entries of
    /// "name:api_key:api_secret:bearer_token"
    #[arg(long, env = "PINNING_CREDENTIALS", default_value = "")]
    pub pinning_credentials: String,

    /// Minimum interval between outbound store requests in milliseconds
    /// (global pacing, independent of which credential is used)
    #[arg(long, env = "STORE_MIN_INTERVAL_MS", default_value = "350")]
    pub store_min_interval_ms: u64,

    /// Minimum spacing between two uses of the same credential in milliseconds
    #[arg(long, env = "CREDENTIAL_MIN_SPACING_MS", default_value = "1000")]
    pub credential_min_spacing_ms: u64,

    /// Timeout for gateway content fetches in seconds
    #[arg(long, env = "STORE_FETCH_TIMEOUT_SECS", default_value = "10")]
    pub store_fetch_timeout_secs: u64,

    /// Comma-separated list of ledger RPC endpoints, tried in order
    #[arg(
        long,
        env = "LEDGER_RPC_URLS",
        default_value = "https://rpc.storychain.example,https://rpc-fallback.storychain.example"
    )]
    pub ledger_rpc_urls: String,

    /// Timeout for the ledger liveness probe in seconds
    #[arg(long, env = "LEDGER_PROBE_TIMEOUT_SECS", default_value = "5")]
    pub ledger_probe_timeout_secs: u64,

    /// Request timeout for ledger RPC calls in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Maximum reconciliations running at the same time
    #[arg(long, env = "MAX_CONCURRENT_SYNCS", default_value = "4")]
    pub max_concurrent_syncs: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Parse the configured pinning credentials.
    ///
    /// Entries are "name:api_key:api_secret:bearer_token". Malformed
    /// entries are dropped here; validate() rejects them.
    pub fn credential_list(&self) -> Vec<StoreCredential> {
        self.pinning_credentials
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|entry| {
                let parts: Vec<&str> = entry.splitn(4, ':').collect();
                match parts.as_slice() {
                    [name, key, secret, token] => Some(StoreCredential {
                        name: (*name).to_string(),
                        api_key: (*key).to_string(),
                        api_secret: (*secret).to_string(),
                        bearer_token: (*token).to_string(),
                    }),
                    _ => None,
                }
            })
            .collect()
    }

    /// Get the list of ledger RPC endpoints in priority order
    pub fn ledger_endpoint_list(&self) -> Vec<String> {
        self.ledger_rpc_urls
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn store_min_interval(&self) -> Duration {
        Duration::from_millis(self.store_min_interval_ms)
    }

    pub fn credential_min_spacing(&self) -> Duration {
        Duration::from_millis(self.credential_min_spacing_ms)
    }

    pub fn store_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.store_fetch_timeout_secs)
    }

    pub fn ledger_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.credential_list().is_empty() {
            return Err(
                "PINNING_CREDENTIALS must contain at least one name:key:secret:token entry"
                    .to_string(),
            );
        }

        let configured = self
            .pinning_credentials
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .count();
        if configured != self.credential_list().len() {
            return Err("PINNING_CREDENTIALS contains a malformed entry".to_string());
        }

        if self.ledger_endpoint_list().is_empty() {
            return Err("LEDGER_RPC_URLS must contain at least one endpoint".to_string());
        }

        if self.max_concurrent_syncs == 0 {
            return Err("MAX_CONCURRENT_SYNCS must be at least 1".to_string());
        }

        Ok(())
    }
}
