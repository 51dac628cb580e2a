//! Relational cache over SQLite
//!
//! The database is a queryable mirror of ledger and store state, never the
//! source of truth. Read APIs serve from here; the reconciliation engine
//! is the only writer of story rows and sync status.

pub mod authors;
pub mod sqlite;
pub mod stories;
pub mod sync_status;

pub use authors::Author;
pub use sqlite::CacheDb;
pub use stories::CachedStory;
pub use sync_status::{SyncStatus, SyncStatusRecord};
