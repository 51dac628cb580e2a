//! HTTP route handlers for Storygate
//!
//! Thin request/response mapping over the read-path contract; all real
//! behavior lives in the sync engine, pinning client and cache.

pub mod health;
pub mod stories;

pub use health::HealthResponse;
pub use stories::{
    author_stories, author_sync_state, register_author, story_detail, trigger_author_sync,
    RegisterAuthorRequest, StoriesResponse, StoryDetailResponse, SyncTriggerResponse,
};
