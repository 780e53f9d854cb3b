//! # Rate Limiting
//!
//! Fixed-window limiter keyed on `(client, service)`: requests are counted in
//! discrete, non-overlapping windows, and a window's counter is a single
//! atomic increment against the shared store, so concurrent requests and
//! multiple gateway instances never lose updates.
//!
//! Requests are counted at admission, before forwarding, whether or not the
//! upstream call later succeeds. This bounds the load a client can impose on a
//! slow or erroring downstream service. The classic fixed-window boundary
//! burst (up to 2x the cap across a window edge) is accepted; the correctness
//! target is bounded average throughput, not exact fairness.

use crate::core::config::RateLimitConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::store::SharedStore;
use axum::http::HeaderMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Fixed-window per-client-per-service request limiter.
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    enabled: bool,
    max_requests: u32,
    window: Duration,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            max_requests: config.max_requests,
            window: config.window,
            key_prefix: config.key_prefix.clone(),
        }
    }

    /// Admit or reject one request from `client_id` to `service`.
    ///
    /// A store failure logs a warning and admits the request: losing the
    /// counter store must not turn into a full gateway outage. (Auth makes the
    /// opposite choice; see `AuthGate`.)
    pub async fn check(&self, client_id: &str, service: &str) -> GatewayResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let key = format!("{}:{}:{}", self.key_prefix, client_id, service);
        match self.store.increment(&key, self.window).await {
            Ok(count) if count > u64::from(self.max_requests) => {
                Err(GatewayError::RateLimitExceeded {
                    limit: self.max_requests,
                    window_secs: self.window.as_secs(),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(client_id, service, error = %e, "rate-limit store unavailable, admitting request");
                Ok(())
            }
        }
    }
}

/// Identify the client for rate limiting: the first `X-Forwarded-For` entry
/// when present (the gateway usually sits behind a load balancer), otherwise
/// the peer address.
pub fn client_identity(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter(max_requests: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryStore::new()),
            &RateLimitConfig {
                enabled: true,
                max_requests,
                window,
                key_prefix: "rate_limit".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_allows_up_to_cap_then_denies() {
        let limiter = limiter(3, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.check("1.2.3.4", "academic").await.unwrap();
        }
        let err = limiter.check("1.2.3.4", "academic").await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_clients_and_services_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        limiter.check("1.2.3.4", "academic").await.unwrap();
        // Different service, same client: separate window.
        limiter.check("1.2.3.4", "financial").await.unwrap();
        // Different client, same service: separate window.
        limiter.check("5.6.7.8", "academic").await.unwrap();
        assert!(limiter.check("1.2.3.4", "academic").await.is_err());
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter(1, Duration::from_millis(40));
        limiter.check("1.2.3.4", "academic").await.unwrap();
        assert!(limiter.check("1.2.3.4", "academic").await.is_err());
        tokio::time::sleep(Duration::from_millis(80)).await;
        limiter.check("1.2.3.4", "academic").await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_limiter_always_admits() {
        let limiter = RateLimiter::new(
            Arc::new(MemoryStore::new()),
            &RateLimitConfig {
                enabled: false,
                max_requests: 1,
                window: Duration::from_secs(60),
                key_prefix: "rate_limit".to_string(),
            },
        );
        for _ in 0..10 {
            limiter.check("1.2.3.4", "academic").await.unwrap();
        }
    }

    #[test]
    fn test_client_identity() {
        let peer: SocketAddr = "10.0.0.9:41000".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, peer), "10.0.0.9");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_identity(&headers, peer), "203.0.113.7");
    }
}
