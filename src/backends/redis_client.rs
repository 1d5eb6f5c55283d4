//! Redis Client - Remote Cache Backend
//!
//! The real cache service behind `CacheBackend`, reached through a
//! `ConnectionManager`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult, redact_uri};
use crate::traits::{CacheCommands, RemoteConnector};

/// Redis cache client with `ConnectionManager` for automatic reconnection
pub struct RedisCacheClient {
    /// Redis connection manager, cloned per command
    conn_manager: ConnectionManager,
}

impl RedisCacheClient {
    /// Connect to `redis_url` and verify the link with a `PING`
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the client cannot be created, the
    /// connection fails or the whole handshake exceeds `connect_timeout`.
    pub async fn connect(redis_url: &str, connect_timeout: Duration) -> CacheResult<Self> {
        let display_url = redact_uri(redis_url);
        info!(redis_url = %display_url, "Connecting Redis cache client");

        let client = Client::open(redis_url).map_err(|e| {
            CacheError::BackendUnavailable(format!("invalid Redis URL {display_url}: {e}"))
        })?;

        let handshake = async {
            let conn_manager = ConnectionManager::new(client).await?;
            let mut conn = conn_manager.clone();
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn_manager)
        };

        let conn_manager = tokio::time::timeout(connect_timeout, handshake)
            .await
            .map_err(|_| {
                CacheError::BackendUnavailable(format!(
                    "connecting to {display_url} timed out after {connect_timeout:?}"
                ))
            })?
            .map_err(|e| CacheError::BackendUnavailable(format!("{display_url}: {e}")))?;

        info!(redis_url = %display_url, "Redis cache client connected");
        Ok(Self { conn_manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }
}

fn positive_ttl(ttl_secs: u64) -> CacheResult<u64> {
    if ttl_secs == 0 {
        return Err(CacheError::InvalidArgument(
            "TTL must be a positive number of seconds".to_string(),
        ));
    }
    Ok(ttl_secs)
}

#[async_trait]
impl CacheCommands for RedisCacheClient {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let value: Option<String> = self
            .conn()
            .get(key)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let _: () = self
            .conn()
            .set(key, value)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(())
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()> {
        let ttl_secs = positive_ttl(ttl_secs)?;
        let _: () = self
            .conn()
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        debug!(key = %key, ttl_secs, "[Redis] Cached key with TTL");
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let removed: u64 = self
            .conn()
            .del(key)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> CacheResult<u64> {
        let present: bool = self
            .conn()
            .exists(key)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(u64::from(present))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        let ttl_secs = i64::try_from(positive_ttl(ttl_secs)?)
            .map_err(|_| CacheError::InvalidArgument(format!("TTL {ttl_secs} is too large")))?;
        let updated: bool = self
            .conn()
            .expire(key, ttl_secs)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(u64::from(updated))
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        let remaining: i64 = self
            .conn()
            .ttl(key)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(remaining)
    }

    async fn flushall(&self) -> CacheResult<()> {
        let mut conn = self.conn();
        let _: () = redis::cmd("FLUSHALL")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::from_redis(&e, "*"))?;
        info!("[Redis] Flushed all keys");
        Ok(())
    }

    /// Uses cursor-based `SCAN` rather than `KEYS` so large keyspaces do not
    /// block the server
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            // SCAN cursor MATCH pattern COUNT 100
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::from_redis(&e, pattern))?;

            cursor = next;
            keys.extend(batch);

            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }

    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        let value: Option<String> = self
            .conn()
            .hget(key, field)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> CacheResult<u64> {
        let added: u64 = self
            .conn()
            .hset(key, field, value)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(added)
    }

    async fn hdel(&self, key: &str, field: &str) -> CacheResult<u64> {
        let removed: u64 = self
            .conn()
            .hdel(key, field)
            .await
            .map_err(|e| CacheError::from_redis(&e, key))?;
        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::from_redis(&e, ""))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}

/// Opens `RedisCacheClient`s for `CacheBackend`
#[derive(Debug, Clone)]
pub struct RedisConnector {
    redis_url: String,
    connect_timeout: Duration,
}

impl RedisConnector {
    /// Create a connector for `redis_url`; nothing is dialled until `connect`
    pub fn new(redis_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            redis_url: redis_url.into(),
            connect_timeout,
        }
    }

    /// Target URL with credentials redacted
    #[must_use]
    pub fn display_url(&self) -> String {
        redact_uri(&self.redis_url)
    }
}

#[async_trait]
impl RemoteConnector for RedisConnector {
    async fn connect(&self) -> CacheResult<Arc<dyn CacheCommands>> {
        let client = RedisCacheClient::connect(&self.redis_url, self.connect_timeout).await?;
        Ok(Arc::new(client))
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_unavailable() {
        let result = RedisCacheClient::connect("not-a-url", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Port 1 is reserved and refuses connections
        let connector = RedisConnector::new("redis://127.0.0.1:1", Duration::from_millis(500));
        let result = connector.connect().await;
        assert!(matches!(result, Err(CacheError::BackendUnavailable(_))));
    }

    #[test]
    fn test_display_url_redacts_password() {
        let connector = RedisConnector::new("redis://:hunter2@cache:6379", Duration::from_secs(1));
        assert_eq!(connector.display_url(), "redis://***@cache:6379");
    }
}
