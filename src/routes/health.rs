//! Health check endpoint
//!
//! Liveness only: the service is healthy as long as it is running, because
//! the read path always answers from cache even when ledger and store are
//! down.

use chrono::Utc;
use serde::Serialize;

/// Response for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    /// Seconds since process start.
    pub uptime: u64,
    pub timestamp: String,
    pub node_id: String,
}

impl HealthResponse {
    pub fn new(node_id: String, uptime_secs: u64) -> Self {
        Self {
            healthy: true,
            status: "online",
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("GIT_COMMIT_SHORT"),
            uptime: uptime_secs,
            timestamp: Utc::now().to_rfc3339(),
            node_id,
        }
    }
}
