//! Cache Facade - Unified Cache Operations
//!
//! The only cache object other subsystems hold. It initializes the backend
//! on the first command it performs (not at construction) and again after
//! every `enable()`, and never reveals whether a command was answered by the
//! remote cache or the in-process store.

use std::sync::Arc;
use tracing::debug;

use crate::cache_backend::{CacheBackend, CacheStatus};
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::keyspace::Keyspace;

/// Backend-agnostic cache entry point
///
/// # Example
///
/// ```rust,no_run
/// use storefront_tenancy::{CacheConfig, CacheFacade, Keyspace};
///
/// # async fn example() -> storefront_tenancy::CacheResult<()> {
/// let cache = CacheFacade::redis(&CacheConfig::default());
///
/// cache.put(Keyspace::Otp, "+15550100", "493021").await?;
/// let code = cache.take(Keyspace::Otp, "+15550100").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheFacade {
    backend: Arc<CacheBackend>,
}

impl CacheFacade {
    /// Wrap an existing backend
    pub fn new(backend: Arc<CacheBackend>) -> Self {
        Self { backend }
    }

    /// Facade over a Redis backend
    #[cfg(feature = "redis")]
    #[must_use]
    pub fn redis(config: &CacheConfig) -> Self {
        Self::new(Arc::new(CacheBackend::redis(config)))
    }

    /// Facade over the mock store only
    #[must_use]
    pub fn in_process(config: &CacheConfig) -> Self {
        Self::new(Arc::new(CacheBackend::mock_only(config)))
    }

    /// Borrow the backend
    #[must_use]
    pub fn backend(&self) -> &Arc<CacheBackend> {
        &self.backend
    }

    async fn ready(&self) -> &CacheBackend {
        if !self.backend.is_initialized() {
            debug!("Initializing cache backend on first use");
            self.backend.init().await;
        }
        &self.backend
    }

    // ===== Command surface =====

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.ready().await.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.ready().await.set(key, value).await
    }

    pub async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()> {
        self.ready().await.setex(key, ttl_secs, value).await
    }

    pub async fn del(&self, key: &str) -> CacheResult<u64> {
        self.ready().await.del(key).await
    }

    pub async fn exists(&self, key: &str) -> CacheResult<u64> {
        self.ready().await.exists(key).await
    }

    pub async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        self.ready().await.expire(key, ttl_secs).await
    }

    pub async fn ttl(&self, key: &str) -> CacheResult<i64> {
        self.ready().await.ttl(key).await
    }

    pub async fn flushall(&self) -> CacheResult<()> {
        self.ready().await.flushall().await
    }

    pub async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.ready().await.keys(pattern).await
    }

    pub async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        self.ready().await.hget(key, field).await
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> CacheResult<u64> {
        self.ready().await.hset(key, field, value).await
    }

    pub async fn hdel(&self, key: &str, field: &str) -> CacheResult<u64> {
        self.ready().await.hdel(key, field).await
    }

    // ===== Keyspace helpers =====

    /// Store `value` under `keyspace`, applying the category's expiry policy
    pub async fn put(&self, keyspace: Keyspace, id: &str, value: &str) -> CacheResult<()> {
        let key = keyspace.key(id);
        match keyspace.policy().ttl_secs() {
            Some(ttl_secs) => self.setex(&key, ttl_secs, value).await,
            None => self.set(&key, value).await,
        }
    }

    /// Read a value from `keyspace`
    pub async fn fetch(&self, keyspace: Keyspace, id: &str) -> CacheResult<Option<String>> {
        self.get(&keyspace.key(id)).await
    }

    /// Read and delete a value, e.g. to consume an OTP exactly once
    pub async fn take(&self, keyspace: Keyspace, id: &str) -> CacheResult<Option<String>> {
        let key = keyspace.key(id);
        let value = self.get(&key).await?;
        if value.is_some() && self.del(&key).await? == 0 {
            // A concurrent taker won
            return Ok(None);
        }
        Ok(value)
    }

    /// Delete a value from `keyspace`; `true` if it existed
    pub async fn revoke(&self, keyspace: Keyspace, id: &str) -> CacheResult<bool> {
        Ok(self.del(&keyspace.key(id)).await? > 0)
    }

    // ===== Operational surface =====

    /// `{enabled, connected, mock_entry_count}` plus counters; never fails
    #[must_use]
    pub fn status(&self) -> CacheStatus {
        self.backend.status()
    }

    /// Turn the remote cache on or off
    pub async fn set_enabled(&self, enabled: bool) {
        if enabled {
            self.backend.enable().await;
        } else {
            self.backend.disable().await;
        }
    }

    /// Round-trip a throwaway key through the active backend
    ///
    /// # Errors
    ///
    /// Surfaces the raw backend error rather than falling back.
    pub async fn test(&self) -> CacheResult<bool> {
        self.backend.round_trip().await
    }

    /// Liveness probe
    ///
    /// # Errors
    ///
    /// Surfaces the raw backend error rather than falling back.
    pub async fn ping(&self) -> CacheResult<()> {
        self.backend.ping().await
    }

    /// Release the remote client and reset state
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}
