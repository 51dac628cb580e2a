//! RPC endpoint fallback and liveness probing
//!
//! Public RPC nodes flake. The factory walks the configured endpoint list
//! in priority order, probes each with a network-id and block-height call,
//! and hands back the first endpoint that answers both.

use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::types::{Result, StorygateError};

/// A live RPC endpoint, as verified by the liveness probe.
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    pub endpoint: String,
    pub network_id: String,
    pub block_height: u64,
}

/// Probe endpoints in order; return the first that answers.
pub async fn connect_provider(
    client: &reqwest::Client,
    endpoints: &[String],
    probe_timeout: Duration,
) -> Result<ProviderHandle> {
    for endpoint in endpoints {
        match probe(client, endpoint, probe_timeout).await {
            Ok(handle) => {
                info!(
                    endpoint = %handle.endpoint,
                    network_id = %handle.network_id,
                    block_height = handle.block_height,
                    "Ledger RPC endpoint is live"
                );
                return Ok(handle);
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "Ledger RPC endpoint failed probe");
            }
        }
    }

    Err(StorygateError::LedgerUnavailable)
}

async fn probe(
    client: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
) -> std::result::Result<ProviderHandle, String> {
    let network_id = rpc_call(client, endpoint, "net_version", json!([]), timeout)
        .await?
        .as_str()
        .map(str::to_string)
        .ok_or("net_version returned a non-string network id")?;

    let height_hex = rpc_call(client, endpoint, "eth_blockNumber", json!([]), timeout)
        .await?
        .as_str()
        .map(str::to_string)
        .ok_or("eth_blockNumber returned a non-string height")?;

    let block_height = u64::from_str_radix(height_hex.trim_start_matches("0x"), 16)
        .map_err(|e| format!("unparseable block height {height_hex}: {e}"))?;

    Ok(ProviderHandle {
        endpoint: endpoint.to_string(),
        network_id,
        block_height,
    })
}

/// Single JSON-RPC 2.0 call; returns the `result` value.
pub(crate) async fn rpc_call(
    client: &reqwest::Client,
    endpoint: &str,
    method: &str,
    params: JsonValue,
    timeout: Duration,
) -> std::result::Result<JsonValue, String> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let response = client
        .post(endpoint)
        .json(&request)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| format!("{method} request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("{method} returned HTTP {}", response.status()));
    }

    let body: JsonValue = response
        .json()
        .await
        .map_err(|e| format!("{method} returned a malformed body: {e}"))?;

    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(format!("{method} RPC error: {error}"));
    }

    body.get("result")
        .cloned()
        .ok_or_else(|| format!("{method} response is missing a result"))
}
