//! # Redis Store
//!
//! Redis-backed implementation of [`SharedStore`] for multi-instance
//! deployments. Values are stored with `SET PX`; counters use `INCR`, with the
//! window TTL applied only when the key is created so every gateway instance
//! observes the same fixed window.

use super::SharedStore;
use crate::core::error::GatewayResult;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::info;

/// Networked store shared by all gateway instances.
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    /// Connect to Redis. The `ConnectionManager` multiplexes and reconnects
    /// internally, so one handle serves all request handlers.
    pub async fn connect(url: &str, key_prefix: &str) -> GatewayResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url, "connected to redis shared store");
        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> GatewayResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> GatewayResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> GatewayResult<u64> {
        let mut conn = self.conn.clone();
        let full_key = self.full_key(key);
        let count: u64 = conn.incr(&full_key, 1u64).await?;
        if count == 1 {
            // First hit in this window: start the expiry clock.
            let _: bool = redis::cmd("PEXPIRE")
                .arg(&full_key)
                .arg(ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await?;
        }
        Ok(count)
    }
}
