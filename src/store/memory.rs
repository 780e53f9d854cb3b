//! # In-Memory Store
//!
//! `DashMap`-backed implementation of [`SharedStore`] with per-entry expiry
//! and a background sweep that drops expired entries. Increment atomicity
//! comes from the map's per-shard locking: the entry is created or updated
//! while the shard lock is held, so concurrent increments never lose updates.

use super::SharedStore;
use crate::core::error::GatewayResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::debug;

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process store, correct for a single gateway instance.
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_sweep_interval(Duration::from_secs(60))
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        let entries: Arc<DashMap<String, Entry>> = Arc::new(DashMap::new());

        let sweeper = {
            let entries = entries.clone();
            tokio::spawn(async move {
                let mut ticker = interval(sweep_interval);
                loop {
                    ticker.tick().await;
                    let before = entries.len();
                    entries.retain(|_, entry| !entry.is_expired());
                    let removed = before.saturating_sub(entries.len());
                    if removed > 0 {
                        debug!(removed, "swept expired store entries");
                    }
                }
            })
        };

        Self { entries, sweeper }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> GatewayResult<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(match &entry.value {
                Value::Bytes(bytes) => bytes.clone(),
                Value::Counter(count) => count.to_string().into_bytes(),
            })),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> GatewayResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value.to_vec()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> GatewayResult<u64> {
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: Instant::now() + ttl,
        });

        if entry.is_expired() {
            // Window elapsed between sweeps: restart the counter in place.
            entry.value = Value::Counter(0);
            entry.expires_at = Instant::now() + ttl;
        }

        let count = match &entry.value {
            Value::Counter(count) => count + 1,
            // A set() overwrote the counter key; restart counting.
            Value::Bytes(_) => 1,
        };
        entry.value = Value::Counter(count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .set("k", b"payload", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"payload".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let store = MemoryStore::new();
        store
            .set("k", b"payload", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_counts_up() {
        let store = MemoryStore::new();
        for expected in 1..=5u64 {
            let count = store.increment("c", Duration::from_secs(5)).await.unwrap();
            assert_eq!(count, expected);
        }
    }

    #[tokio::test]
    async fn test_increment_resets_after_ttl() {
        let store = MemoryStore::new();
        assert_eq!(
            store.increment("c", Duration::from_millis(30)).await.unwrap(),
            1
        );
        assert_eq!(
            store.increment("c", Duration::from_millis(30)).await.unwrap(),
            2
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        // Window elapsed: the counter starts over.
        assert_eq!(
            store.increment("c", Duration::from_millis(30)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_increment_ttl_fixed_at_creation() {
        let store = MemoryStore::new();
        store.increment("c", Duration::from_millis(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        // This increment must not extend the window.
        store.increment("c", Duration::from_millis(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(
            store.increment("c", Duration::from_millis(60)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_increments_lose_no_updates() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.increment("c", Duration::from_secs(10)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(
            store.increment("c", Duration::from_secs(10)).await.unwrap(),
            801
        );
    }

    #[tokio::test]
    async fn test_sweeper_drops_expired_entries() {
        let store = MemoryStore::with_sweep_interval(Duration::from_millis(20));
        store
            .set("k", b"v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.is_empty());
    }
}
