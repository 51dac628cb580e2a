//! HTTP server for Storygate

pub mod http;

pub use http::{run, AppState};
