//! Short-TTL caching of successful GET responses.

pub mod response_cache;

pub use response_cache::{CachedResponse, ResponseCache};
