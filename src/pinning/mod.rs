//! Content-addressed store client
//!
//! Talks to a third-party pinning service: authenticated writes against
//! the pinning API, bearer-authenticated reads through the public gateway
//! path. Every call acquires a credential from the pool and runs inside
//! the paced scheduler; rate-limit signals become credential cooldowns and
//! the call rotates to the next credential, so callers see none of it.

pub mod client;
pub mod envelope;
pub mod memory;
pub mod transport;

pub use client::PinningClient;
pub use envelope::PinEnvelope;
pub use memory::MemoryStoreTransport;
pub use transport::{HttpStoreTransport, PinBody, StoreTransport, TransportError};
