//! # Response Cache
//!
//! Short-TTL cache of successful (2xx) JSON responses to GET requests, backed
//! by the shared store. Paths under the configured bypass prefix (`/api/` by
//! convention) are never cached: those endpoints are orchestration calls that
//! may not be idempotent even when nominally GET.
//!
//! The cache key is `(method, full request path)` only. Two GETs differing
//! only in query string share an entry; configured cacheable paths are
//! query-free, so this path-only key is preserved deliberately rather than
//! broadened. Entries are invalidated by expiry alone: a mutating request to
//! the same resource does not evict the entry, so reads can be up to one TTL
//! stale. Both limitations are inherited behavior, not bugs to fix here.

use crate::core::config::CacheConfig;
use crate::core::error::GatewayResult;
use crate::store::SharedStore;
use axum::http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A replayable cached response: the upstream status and its JSON payload.
/// Hits replay the stored status verbatim, never a forced 200.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// GET-only response cache over the shared store.
pub struct ResponseCache {
    store: Arc<dyn SharedStore>,
    enabled: bool,
    ttl: Duration,
    bypass_prefix: String,
    key_prefix: String,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn SharedStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            ttl: config.ttl,
            bypass_prefix: config.bypass_prefix.clone(),
            key_prefix: config.key_prefix.clone(),
        }
    }

    /// Whether this request is eligible for caching at all.
    pub fn is_cacheable(&self, method: &Method, path: &str) -> bool {
        self.enabled && method == Method::GET && !path.starts_with(&self.bypass_prefix)
    }

    fn key(&self, method: &Method, path: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, method, path)
    }

    /// Look up a cached response. Store failures and undecodable entries
    /// degrade to a miss.
    pub async fn lookup(&self, method: &Method, path: &str) -> Option<CachedResponse> {
        if !self.is_cacheable(method, path) {
            return None;
        }

        let key = self.key(method, path);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "cache store unavailable, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(key, error = %e, "corrupt cache entry, treating as miss");
                None
            }
        }
    }

    /// Store a response if it qualifies: cacheable request, 2xx status, JSON
    /// payload. Store failures are logged and swallowed; caching is
    /// best-effort.
    pub async fn store_response(
        &self,
        method: &Method,
        path: &str,
        status: StatusCode,
        body: &serde_json::Value,
    ) -> GatewayResult<()> {
        if !self.is_cacheable(method, path) || !status.is_success() {
            return Ok(());
        }

        let key = self.key(method, path);
        let entry = CachedResponse {
            status: status.as_u16(),
            body: body.clone(),
        };
        let raw = serde_json::to_vec(&entry)
            .map_err(|e| crate::core::error::GatewayError::internal(e.to_string()))?;

        if let Err(e) = self.store.set(&key, &raw, self.ttl).await {
            warn!(key, error = %e, "failed to write cache entry");
        } else {
            debug!(key, status = status.as_u16(), "cached response");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn cache(ttl: Duration) -> ResponseCache {
        ResponseCache::new(
            Arc::new(MemoryStore::new()),
            &CacheConfig {
                enabled: true,
                ttl,
                bypass_prefix: "/api/".to_string(),
                key_prefix: "gateway".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_store_and_replay_with_status() {
        let cache = cache(Duration::from_secs(60));
        let body = json!({"id": 5, "name": "CS"});
        cache
            .store_response(&Method::GET, "/academic/courses/5", StatusCode::OK, &body)
            .await
            .unwrap();

        let hit = cache.lookup(&Method::GET, "/academic/courses/5").await.unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, body);
    }

    #[tokio::test]
    async fn test_non_2xx_is_not_cached() {
        let cache = cache(Duration::from_secs(60));
        cache
            .store_response(
                &Method::GET,
                "/academic/courses/404",
                StatusCode::NOT_FOUND,
                &json!({"error": "no such course"}),
            )
            .await
            .unwrap();
        assert!(cache.lookup(&Method::GET, "/academic/courses/404").await.is_none());
    }

    #[tokio::test]
    async fn test_api_prefix_bypasses_cache() {
        let cache = cache(Duration::from_secs(60));
        assert!(!cache.is_cacheable(&Method::GET, "/api/v1/courses/"));
        cache
            .store_response(&Method::GET, "/api/v1/courses/", StatusCode::OK, &json!([]))
            .await
            .unwrap();
        assert!(cache.lookup(&Method::GET, "/api/v1/courses/").await.is_none());
    }

    #[tokio::test]
    async fn test_only_get_is_cacheable() {
        let cache = cache(Duration::from_secs(60));
        assert!(cache.is_cacheable(&Method::GET, "/academic/courses/"));
        assert!(!cache.is_cacheable(&Method::POST, "/academic/courses/"));
        assert!(!cache.is_cacheable(&Method::DELETE, "/academic/courses/1"));
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let cache = cache(Duration::from_millis(30));
        cache
            .store_response(&Method::GET, "/academic/terms/", StatusCode::OK, &json!([]))
            .await
            .unwrap();
        assert!(cache.lookup(&Method::GET, "/academic/terms/").await.is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.lookup(&Method::GET, "/academic/terms/").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = ResponseCache::new(
            Arc::new(MemoryStore::new()),
            &CacheConfig {
                enabled: false,
                ttl: Duration::from_secs(60),
                bypass_prefix: "/api/".to_string(),
                key_prefix: "gateway".to_string(),
            },
        );
        cache
            .store_response(&Method::GET, "/academic/courses/", StatusCode::OK, &json!([]))
            .await
            .unwrap();
        assert!(cache.lookup(&Method::GET, "/academic/courses/").await.is_none());
    }
}
