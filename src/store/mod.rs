//! # Shared Store Module
//!
//! Rate counters and cached responses are the only shared mutable state in the
//! gateway, and both live behind the [`SharedStore`] trait: a key-value store
//! with TTL-based expiry and an atomic increment. The in-memory backend is
//! correct for a single gateway instance (and for tests); the Redis backend is
//! the shared store for horizontally scaled deployments, where per-process
//! counters would fragment the rate-limit count.
//!
//! There is no explicit delete path. Entries only ever disappear by expiry.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::core::config::{StoreBackend, StoreConfig};
use crate::core::error::GatewayResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared ephemeral key-value store with TTL and atomic increment.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Fetch a value. Expired keys read as absent.
    async fn get(&self, key: &str) -> GatewayResult<Option<Vec<u8>>>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> GatewayResult<()>;

    /// Atomically increment a counter, creating it with `ttl` when absent or
    /// expired, and return the new count. The TTL is fixed at creation; later
    /// increments do not extend it (fixed-window semantics).
    async fn increment(&self, key: &str, ttl: Duration) -> GatewayResult<u64>;
}

/// Build the store backend selected by configuration.
pub async fn build_store(config: &StoreConfig) -> GatewayResult<Arc<dyn SharedStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("using in-memory shared store (single-instance mode)");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url, &config.key_prefix).await?;
            Ok(Arc::new(store))
        }
    }
}
