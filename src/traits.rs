//! Backend Traits
//!
//! The seams between this crate and the services it sits on top of:
//!
//! - `CacheCommands`: the key-value command surface shared by the real remote
//!   cache client and the in-process mock store
//! - `RemoteConnector`: opens a remote cache client (lazily, on first command)
//! - `StoreConnector`: opens a persistent-store connection for a store address
//! - `TenantDirectory`: looks up a tenant's record over the default connection
//!
//! # Example: Custom Store
//!
//! ```rust,ignore
//! use storefront_tenancy::{StoreConnector, TenancyResult, async_trait};
//!
//! struct PgConnector;
//!
//! #[async_trait]
//! impl StoreConnector for PgConnector {
//!     type Connection = sqlx::PgPool;
//!
//!     async fn connect(&self, address: &str) -> TenancyResult<Self::Connection> {
//!         // Your implementation
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{CacheResult, TenancyResult};
use crate::tenant::TenantRecord;

/// Key-value command surface of the cache
///
/// Implemented by `RedisCacheClient` (remote) and `MockStore` (in-process).
/// Callers never pick an implementation themselves: `CacheBackend` routes
/// each command to whichever one is active.
///
/// # TTL Semantics
///
/// - `ttl` returns remaining seconds, `-1` for a key without expiry and `-2`
///   for a missing key
/// - An expired key behaves exactly like a missing key for every command
#[async_trait]
pub trait CacheCommands: Send + Sync {
    /// Get a string value, `None` if missing or expired
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value, overwriting unconditionally and clearing any prior expiry
    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Set a value that becomes unreadable after `ttl_secs` (must be > 0)
    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()>;

    /// Delete a key, returning the number of keys removed (0 or 1)
    async fn del(&self, key: &str) -> CacheResult<u64>;

    /// 1 if the key is present and not expired, else 0
    async fn exists(&self, key: &str) -> CacheResult<u64>;

    /// Set or overwrite the TTL of an existing key; 0 if the key is absent
    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<u64>;

    /// Remaining TTL in seconds (`-1` no expiry, `-2` missing)
    async fn ttl(&self, key: &str) -> CacheResult<i64>;

    /// Clear all state
    async fn flushall(&self) -> CacheResult<()>;

    /// All live keys matching a glob pattern, in unspecified order
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Read one field of a hash
    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>>;

    /// Write one field of a hash; 1 if the field is new, 0 if it was updated
    async fn hset(&self, key: &str, field: &str, value: &str) -> CacheResult<u64>;

    /// Remove one field of a hash; number of fields removed
    async fn hdel(&self, key: &str, field: &str) -> CacheResult<u64>;

    /// Liveness probe
    async fn ping(&self) -> CacheResult<()>;

    /// Name of this implementation for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Opens a remote cache client
///
/// Called by `CacheBackend` on the first command after it becomes enabled,
/// and again after every `enable()`.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Establish a fresh client; failures are `BackendUnavailable`
    async fn connect(&self) -> CacheResult<Arc<dyn CacheCommands>>;

    /// Name of the remote service for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Opens persistent-store connections
///
/// The connection type is opaque to this crate; `ConnectionRegistry` wraps
/// each one in a shared `ConnectionHandle` and never opens two for the same
/// address.
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    /// Established connection
    type Connection: Send + Sync + 'static;

    /// Connect to `address`
    ///
    /// The registry bounds this call with its own timeout.
    async fn connect(&self, address: &str) -> TenancyResult<Self::Connection>;

    /// Name of the store for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Read path from tenant key to tenant record
///
/// Always reached through the default connection. Implementations keep no
/// cache of their own.
#[async_trait]
pub trait TenantDirectory<C>: Send + Sync + 'static
where
    C: Send + Sync + 'static,
{
    /// Find a live (not deleted) tenant record
    async fn find_by_key(&self, conn: &C, tenant_key: &str)
    -> TenancyResult<Option<TenantRecord>>;
}
