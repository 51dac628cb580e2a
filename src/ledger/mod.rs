//! Ledger gateway
//!
//! The story ledger is an external system of record reached over JSON-RPC.
//! This module treats it strictly as a boundary: a provider factory that
//! probes a prioritized endpoint list and returns the first live handle,
//! and a typed read client over that handle. Contract internals (rarity,
//! tipping, mining) are the chain's business, not ours.

pub mod client;
pub mod provider;

pub use client::{JsonRpcLedger, LedgerClient, LedgerStory};
pub use provider::{connect_provider, ProviderHandle};
