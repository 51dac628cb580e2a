//! Retry/rotation driver for store operations
//!
//! A single logical call walks ACQUIRE_CREDENTIAL -> ATTEMPT and loops on
//! failure: rate limits block the credential for the advertised cooldown,
//! transient errors rotate to the next credential, and the whole call
//! gives up after 2x the credential count attempts.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::credentials::{CredentialPool, StoreCredential};
use crate::scheduler::RequestScheduler;
use crate::types::{Result, StorygateError};

use super::envelope::PinEnvelope;
use super::transport::{PinBody, StoreTransport, TransportError};

/// Client for the content-addressed pinning store.
///
/// Owns nothing global: the pool, scheduler and transport are injected so
/// every instance carries its own mutable state.
pub struct PinningClient<T: StoreTransport> {
    pool: Arc<CredentialPool>,
    scheduler: Arc<RequestScheduler>,
    transport: Arc<T>,
}

impl<T: StoreTransport + 'static> PinningClient<T> {
    pub fn new(
        pool: Arc<CredentialPool>,
        scheduler: Arc<RequestScheduler>,
        transport: Arc<T>,
    ) -> Self {
        Self {
            pool,
            scheduler,
            transport,
        }
    }

    /// Pin an opaque text payload; returns its content address.
    pub async fn put_text(&self, name: &str, text: &str) -> Result<String> {
        let payload = serde_json::to_value(PinEnvelope::text(text))?;
        self.pin_payload("put", name, PinBody::Json(payload)).await
    }

    /// Pin a structured payload; returns its content address.
    pub async fn put_json(&self, name: &str, content: JsonValue) -> Result<String> {
        let payload = serde_json::to_value(PinEnvelope::structured(content))?;
        self.pin_payload("put_json", name, PinBody::Json(payload))
            .await
    }

    /// Pin raw bytes (cover images and the like); returns the address.
    pub async fn put_binary(&self, name: &str, bytes: Bytes) -> Result<String> {
        self.pin_payload("put_binary", name, PinBody::Binary(bytes))
            .await
    }

    /// Fetch a payload and unwrap its envelope; non-envelope payloads are
    /// returned verbatim.
    pub async fn get_text(&self, address: &str) -> Result<String> {
        let bytes = self.fetch_raw(address).await?;
        let body = String::from_utf8_lossy(&bytes).to_string();
        Ok(PinEnvelope::unwrap_text(&body))
    }

    /// Fetch a payload known to be structured data, without envelope
    /// unwrapping.
    pub async fn get_json<D: DeserializeOwned>(&self, address: &str) -> Result<D> {
        let bytes = self.fetch_raw(address).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            StorygateError::Store(format!("payload at {address} is not valid JSON: {e}"))
        })
    }

    async fn pin_payload(
        &self,
        operation: &'static str,
        name: &str,
        body: PinBody,
    ) -> Result<String> {
        let name = name.to_string();
        self.run_with_retries(operation, name.clone(), move |transport, credential| {
            let name = name.clone();
            let body = body.clone();
            async move { transport.pin(&credential, &name, body).await }
        })
        .await
    }

    async fn fetch_raw(&self, address: &str) -> Result<Bytes> {
        let address = address.to_string();
        self.run_with_retries("get", address.clone(), move |transport, credential| {
            let address = address.clone();
            async move { transport.fetch(&credential, &address).await }
        })
        .await
    }

    /// Drive one logical store call to success or exhaustion.
    async fn run_with_retries<R, F, Fut>(
        &self,
        operation: &'static str,
        target: String,
        attempt: F,
    ) -> Result<R>
    where
        R: Send + 'static,
        F: Fn(Arc<T>, StoreCredential) -> Fut,
        Fut: Future<Output = std::result::Result<R, TransportError>> + Send + 'static,
    {
        let max_attempts = 2 * self.pool.len() as u32;
        let mut attempts = 0u32;

        loop {
            let credential = self.pool.acquire_ready().await;
            attempts += 1;

            let work = attempt(Arc::clone(&self.transport), credential.clone());
            match self.scheduler.enqueue(work).await? {
                Ok(value) => {
                    self.pool.mark_used(&credential);
                    debug!(operation, target = %target, attempts, "Store call succeeded");
                    return Ok(value);
                }
                Err(TransportError::RateLimited { retry_after }) => {
                    warn!(
                        operation,
                        target = %target,
                        credential = %credential.name,
                        retry_after_secs = retry_after.as_secs(),
                        "Credential rate limited, cooling down and rotating"
                    );
                    self.pool.mark_blocked(&credential, retry_after);
                }
                Err(TransportError::Timeout) => {
                    warn!(
                        operation,
                        target = %target,
                        credential = %credential.name,
                        "Store call timed out, rotating credential"
                    );
                }
                Err(TransportError::Other(message)) => {
                    warn!(
                        operation,
                        target = %target,
                        credential = %credential.name,
                        error = %message,
                        "Store call failed, rotating credential"
                    );
                }
            }

            if attempts >= max_attempts {
                return Err(StorygateError::StoreExhausted {
                    operation,
                    target,
                    attempts,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::pinning::memory::MemoryStoreTransport;

    fn credentials(count: usize) -> Vec<StoreCredential> {
        (0..count)
            .map(|i| StoreCredential {
                name: format!("cred-{i}"),
                api_key: format!("key-{i}"),
                api_secret: format!("secret-{i}"),
                bearer_token: format!("jwt-{i}"),
            })
            .collect()
    }

    fn client<T: StoreTransport + 'static>(
        transport: Arc<T>,
        credential_count: usize,
    ) -> PinningClient<T> {
        let pool =
            Arc::new(CredentialPool::new(credentials(credential_count), Duration::ZERO).unwrap());
        let scheduler = Arc::new(RequestScheduler::new(Duration::ZERO));
        PinningClient::new(pool, scheduler, transport)
    }

    /// Transport that replays a scripted prefix of failures, then succeeds.
    struct ScriptedTransport {
        inner: MemoryStoreTransport,
        pin_failures: Mutex<VecDeque<TransportError>>,
        fetch_failures: Mutex<VecDeque<TransportError>>,
        attempts: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(
            pin_failures: Vec<TransportError>,
            fetch_failures: Vec<TransportError>,
        ) -> Self {
            Self {
                inner: MemoryStoreTransport::new(),
                pin_failures: Mutex::new(pin_failures.into()),
                fetch_failures: Mutex::new(fetch_failures.into()),
                attempts: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StoreTransport for ScriptedTransport {
        async fn pin(
            &self,
            credential: &StoreCredential,
            name: &str,
            body: PinBody,
        ) -> std::result::Result<String, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = self.pin_failures.lock().unwrap().pop_front() {
                return Err(failure);
            }
            self.inner.pin(credential, name, body).await
        }

        async fn fetch(
            &self,
            credential: &StoreCredential,
            address: &str,
        ) -> std::result::Result<Bytes, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = self.fetch_failures.lock().unwrap().pop_front() {
                return Err(failure);
            }
            self.inner.fetch(credential, address).await
        }
    }

    /// Transport that rate-limits every call.
    struct AlwaysRateLimited {
        attempts: AtomicU32,
        retry_after: Duration,
    }

    #[async_trait]
    impl StoreTransport for AlwaysRateLimited {
        async fn pin(
            &self,
            _credential: &StoreCredential,
            _name: &str,
            _body: PinBody,
        ) -> std::result::Result<String, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::RateLimited {
                retry_after: self.retry_after,
            })
        }

        async fn fetch(
            &self,
            _credential: &StoreCredential,
            _address: &str,
        ) -> std::result::Result<Bytes, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::RateLimited {
                retry_after: self.retry_after,
            })
        }
    }

    #[tokio::test]
    async fn text_round_trip() {
        let transport = Arc::new(MemoryStoreTransport::new());
        let client = client(Arc::clone(&transport), 2);

        let address = client.put_text("chapter-1", "It was a dark night").await.unwrap();
        let fetched = client.get_text(&address).await.unwrap();

        assert_eq!(fetched, "It was a dark night");
    }

    #[tokio::test]
    async fn structured_round_trip() {
        let transport = Arc::new(MemoryStoreTransport::new());
        let client = client(Arc::clone(&transport), 2);

        let content = serde_json::json!({ "description": "a serialized mystery", "body": "..." });
        let address = client.put_json("story-7", content.clone()).await.unwrap();

        // get_json sees the envelope as stored; get_text unwraps it.
        let envelope: PinEnvelope = client.get_json(&address).await.unwrap();
        assert_eq!(envelope.content, content);

        let unwrapped = client.get_text(&address).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&unwrapped).unwrap();
        assert_eq!(parsed, content);
    }

    #[tokio::test]
    async fn binary_round_trip_through_the_transport() {
        let transport = Arc::new(MemoryStoreTransport::new());
        let client = client(Arc::clone(&transport), 1);

        let cover = Bytes::from_static(&[0x89, 0x50, 0x4e, 0x47]);
        let address = client.put_binary("cover.png", cover.clone()).await.unwrap();

        let fetched = transport
            .fetch(
                &credentials(1).remove(0),
                &address,
            )
            .await
            .unwrap();
        assert_eq!(fetched, cover);
    }

    #[tokio::test]
    async fn non_envelope_payload_is_returned_raw() {
        let transport = Arc::new(MemoryStoreTransport::new());
        let address = transport.seed("raw content from other tooling");
        let client = client(Arc::clone(&transport), 1);

        let fetched = client.get_text(&address).await.unwrap();
        assert_eq!(fetched, "raw content from other tooling");
    }

    #[tokio::test(start_paused = true)]
    async fn put_recovers_transparently_from_rate_limit() {
        let transport = Arc::new(ScriptedTransport::new(
            vec![TransportError::RateLimited {
                retry_after: Duration::from_secs(2),
            }],
            Vec::new(),
        ));
        let client = client(Arc::clone(&transport), 2);

        let address = client.put_text("greeting", "hello").await.unwrap();
        assert!(address.starts_with("bafy"));
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn get_rotates_past_timeouts() {
        let transport = Arc::new(ScriptedTransport::new(
            Vec::new(),
            vec![TransportError::Timeout],
        ));
        let address = transport.inner.seed(
            serde_json::to_string(&PinEnvelope::text("slow but there")).unwrap(),
        );
        let client = client(Arc::clone(&transport), 2);

        let fetched = client.get_text(&address).await.unwrap();
        assert_eq!(fetched, "slow but there");
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn get_exhausts_after_twice_the_credential_count() {
        let transport = Arc::new(AlwaysRateLimited {
            attempts: AtomicU32::new(0),
            retry_after: Duration::from_secs(1),
        });
        let client = client(Arc::clone(&transport), 2);

        let err = client.get_text("bafymissing").await.unwrap_err();
        match err {
            StorygateError::StoreExhausted {
                operation,
                target,
                attempts,
            } => {
                assert_eq!(operation, "get");
                assert_eq!(target, "bafymissing");
                assert_eq!(attempts, 4);
            }
            other => panic!("expected exhaustion, got {other}"),
        }
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn put_exhausts_with_bounded_attempts() {
        let transport = Arc::new(AlwaysRateLimited {
            attempts: AtomicU32::new(0),
            retry_after: Duration::from_secs(1),
        });
        let client = client(Arc::clone(&transport), 3);

        let err = client.put_text("doomed", "payload").await.unwrap_err();
        match err {
            StorygateError::StoreExhausted { attempts, .. } => assert_eq!(attempts, 6),
            other => panic!("expected exhaustion, got {other}"),
        }
    }
}
