//! Ledger-to-cache reconciliation
//!
//! Pulls authoritative story records from the ledger, resolves their
//! content through the pinning store, and merges the result into the
//! relational cache. Tolerates partial failure: a story that cannot be
//! resolved is skipped, not fatal.

pub mod engine;

use serde::{Deserialize, Serialize};

pub use engine::{SyncEngine, SyncEngineConfig};

/// Expected shape of a story's pinned content payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryContent {
    pub description: String,
    #[serde(default)]
    pub body: String,
}

impl StoryContent {
    /// Degraded fallback for payloads that are not in the expected shape:
    /// keep the raw text, with a truncated preview as the description.
    pub fn preview_of(raw: &str, max_chars: usize) -> Self {
        Self {
            description: raw.chars().take(max_chars).collect(),
            body: raw.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let content = StoryContent::preview_of("héllo wörld, this is raw", 11);
        assert_eq!(content.description, "héllo wörld");
        assert_eq!(content.body, "héllo wörld, this is raw");
    }
}
