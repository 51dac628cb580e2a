//! Storygate - sync gateway for serialized stories
//!
//! Authors publish serialized stories whose canonical content lives in a
//! content-addressed pinning store while ownership and chapter metadata
//! live on a public ledger. Storygate keeps a relational cache of both
//! consistent, and serves reads from that cache without ever blocking on
//! either external system.
//!
//! ## Services
//!
//! - **Credentials**: rotating pool of pinning credentials with cooldowns
//! - **Scheduler**: global FIFO pacing for outbound store calls
//! - **Pinning**: put/get against the content-addressed store with
//!   credential rotation and bounded retries
//! - **Ledger**: RPC endpoint fallback and typed story reads
//! - **Sync**: per-author pull-resolve-merge reconciliation
//! - **Routes/Server**: cache-first read API with freshness annotations

pub mod config;
pub mod credentials;
pub mod db;
pub mod ledger;
pub mod pinning;
pub mod routes;
pub mod scheduler;
pub mod server;
pub mod sync;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, StorygateError};
