//! Wire transport to the pinning service
//!
//! The trait is the seam between the retry/rotation logic and HTTP:
//! `PinningClient` drives retries against any transport, tests drive it
//! against an in-memory one.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::credentials::StoreCredential;
use crate::types::StorygateError;

/// Cooldown applied when a 429 response omits `retry-after`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Body shapes accepted by the pin endpoint.
#[derive(Debug, Clone)]
pub enum PinBody {
    Json(JsonValue),
    Binary(Bytes),
}

/// Transport-level failure, classified for the retry loop.
#[derive(Debug)]
pub enum TransportError {
    /// The store rate-limited this credential; cool it down for
    /// `retry_after` before presenting it again.
    RateLimited { retry_after: Duration },
    /// The request timed out.
    Timeout,
    /// Anything else: connection reset, 5xx, malformed response.
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::RateLimited { retry_after } => {
                write!(f, "rate limited, retry after {}s", retry_after.as_secs())
            }
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Raw store operations, one credential per call.
#[async_trait]
pub trait StoreTransport: Send + Sync {
    /// Pin a payload under `name`; returns the content address.
    async fn pin(
        &self,
        credential: &StoreCredential,
        name: &str,
        body: PinBody,
    ) -> Result<String, TransportError>;

    /// Fetch a payload by content address through the gateway.
    async fn fetch(
        &self,
        credential: &StoreCredential,
        address: &str,
    ) -> Result<Bytes, TransportError>;
}

/// Successful pin response from the pinning API.
#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// HTTP transport against the real pinning service.
pub struct HttpStoreTransport {
    client: reqwest::Client,
    api_url: String,
    gateway_url: String,
    fetch_timeout: Duration,
}

impl HttpStoreTransport {
    pub fn new(
        api_url: String,
        gateway_url: String,
        fetch_timeout: Duration,
    ) -> Result<Self, StorygateError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StorygateError::Store(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            fetch_timeout,
        })
    }

    fn classify(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Read the advertised cooldown from a 429 response.
fn retry_after(response: &reqwest::Response) -> Duration {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[async_trait]
impl StoreTransport for HttpStoreTransport {
    async fn pin(
        &self,
        credential: &StoreCredential,
        name: &str,
        body: PinBody,
    ) -> Result<String, TransportError> {
        let request = match body {
            PinBody::Json(content) => self
                .client
                .post(format!("{}/pinning/pinJSONToIPFS", self.api_url))
                .json(&serde_json::json!({
                    "pinataMetadata": { "name": name },
                    "pinataContent": content,
                })),
            PinBody::Binary(bytes) => {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name(name.to_string());
                self.client
                    .post(format!("{}/pinning/pinFileToIPFS", self.api_url))
                    .multipart(reqwest::multipart::Form::new().part("file", part))
            }
        };

        let response = request
            .header("pinata_api_key", &credential.api_key)
            .header("pinata_secret_api_key", &credential.api_secret)
            .send()
            .await
            .map_err(Self::classify)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !response.status().is_success() {
            return Err(TransportError::Other(format!(
                "pin request failed with status {}",
                response.status()
            )));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Other(format!("malformed pin response: {e}")))?;

        debug!(address = %pinned.ipfs_hash, name = %name, "Payload pinned");
        Ok(pinned.ipfs_hash)
    }

    async fn fetch(
        &self,
        credential: &StoreCredential,
        address: &str,
    ) -> Result<Bytes, TransportError> {
        let response = self
            .client
            .get(format!("{}/ipfs/{}", self.gateway_url, address))
            .bearer_auth(&credential.bearer_token)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(Self::classify)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !response.status().is_success() {
            return Err(TransportError::Other(format!(
                "gateway returned status {} for {}",
                response.status(),
                address
            )));
        }

        response.bytes().await.map_err(Self::classify)
    }
}
