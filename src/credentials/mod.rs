//! Pinning credential management
//!
//! The pinning service enforces per-credential rate limits. The pool owns
//! the configured credential set and its cooldown bookkeeping so callers
//! never have to reason about which credential is safe to present.

pub mod pool;

pub use pool::{Acquire, CredentialPool, StoreCredential};
