//! In-memory store transport for tests and local development
//!
//! Addresses are derived from the payload bytes, so equal content pins to
//! the same address just like the real content-addressed store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::credentials::StoreCredential;

use super::transport::{PinBody, StoreTransport, TransportError};

/// Simple in-memory content-addressed store.
#[derive(Default)]
pub struct MemoryStoreTransport {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStoreTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a payload directly, bypassing the pin path. Useful for
    /// seeding content "written by other tooling" (no envelope).
    pub fn seed(&self, body: impl Into<Bytes>) -> String {
        let body = body.into();
        let address = address_of(&body);
        self.lock().insert(address.clone(), body);
        address
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bytes>> {
        match self.blobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn address_of(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("bafy{}", hex::encode(&hasher.finalize()[..16]))
}

#[async_trait]
impl StoreTransport for MemoryStoreTransport {
    async fn pin(
        &self,
        _credential: &StoreCredential,
        _name: &str,
        body: PinBody,
    ) -> Result<String, TransportError> {
        let bytes = match body {
            PinBody::Json(value) => Bytes::from(
                serde_json::to_vec(&value)
                    .map_err(|e| TransportError::Other(format!("unserializable payload: {e}")))?,
            ),
            PinBody::Binary(bytes) => bytes,
        };
        Ok(self.seed(bytes))
    }

    async fn fetch(
        &self,
        _credential: &StoreCredential,
        address: &str,
    ) -> Result<Bytes, TransportError> {
        self.lock()
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::Other(format!("no payload at {address}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> StoreCredential {
        StoreCredential {
            name: "test".to_string(),
            api_key: "k".to_string(),
            api_secret: "s".to_string(),
            bearer_token: "t".to_string(),
        }
    }

    #[tokio::test]
    async fn pins_and_fetches_by_content_address() {
        let store = MemoryStoreTransport::new();
        let address = store
            .pin(
                &credential(),
                "blob",
                PinBody::Binary(Bytes::from_static(b"hello world")),
            )
            .await
            .unwrap();

        assert!(address.starts_with("bafy"));
        let body = store.fetch(&credential(), &address).await.unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn equal_content_pins_to_equal_address() {
        let store = MemoryStoreTransport::new();
        let a = store.seed("same bytes");
        let b = store.seed("same bytes");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }
}
