//! Connection Registry - Tenant to Store Connection Cache
//!
//! Maps a tenant key (or the default store) to a lazily created, shared
//! connection handle.
//!
//! # Guarantees
//!
//! - Handles are cached by resolved store address, not tenant key, so two
//!   tenants pointing at the same address share one connection
//! - Repeated resolutions return the *same* handle instance
//! - Concurrent first resolutions of an address coalesce into a single
//!   connection attempt; every waiter receives its result, success or failure
//! - An attempt that exceeds the connect timeout fails everyone waiting on it
//!   with `ConnectionTimeout`, and a failed attempt clears the in-flight
//!   marker so a later call can retry

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{TenancyError, TenancyResult, redact_uri};
use crate::tenant::TenantStatus;
use crate::traits::{StoreConnector, TenantDirectory};

/// Shared reference to an established store connection
///
/// Cloning is cheap; clones compare equal under [`ConnectionHandle::ptr_eq`].
pub struct ConnectionHandle<T> {
    inner: Arc<T>,
}

impl<T> ConnectionHandle<T> {
    fn new(connection: T) -> Self {
        Self {
            inner: Arc::new(connection),
        }
    }

    /// Whether two handles refer to the same connection instance
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// The underlying shared connection
    #[must_use]
    pub fn as_arc(&self) -> &Arc<T> {
        &self.inner
    }
}

impl<T> Clone for ConnectionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for ConnectionHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for ConnectionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionHandle").field(&self.inner).finish()
    }
}

/// One cached connection; exactly one exists per store address
pub struct ConnectionCacheEntry<T> {
    pub key: String,
    pub handle: ConnectionHandle<T>,
    pub created_at: SystemTime,
}

impl<T> Clone for ConnectionCacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            handle: self.handle.clone(),
            created_at: self.created_at,
        }
    }
}

type PendingConnect<T> = Shared<BoxFuture<'static, TenancyResult<ConnectionHandle<T>>>>;

#[derive(Debug, Default)]
struct AtomicRegistryStats {
    cache_hits: AtomicU64,
    coalesced_waiters: AtomicU64,
    connections_opened: AtomicU64,
    failed_attempts: AtomicU64,
}

/// Registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Resolutions answered from the cache
    pub cache_hits: u64,
    /// Callers that joined an attempt already in flight
    pub coalesced_waiters: u64,
    pub connections_opened: u64,
    pub failed_attempts: u64,
    /// Connections currently cached
    pub cached_connections: usize,
}

/// Tenant-aware connection cache
///
/// # Example
///
/// ```rust
/// use storefront_tenancy::{ConnectionRegistry, StoreConfig, TenantRecord};
/// use storefront_tenancy::store::{MemoryConnector, MemoryTenantDirectory};
///
/// # async fn example() -> storefront_tenancy::TenancyResult<()> {
/// let config = StoreConfig { default_store_uri: "mem://default".into(), ..StoreConfig::default() };
/// let connector = MemoryConnector::new();
/// connector
///     .database("mem://default")
///     .upsert_tenant(TenantRecord::new("acme", "mem://acme"));
///
/// let registry = ConnectionRegistry::new(connector, MemoryTenantDirectory, &config);
/// let acme = registry.resolve(Some("acme")).await?;
/// assert_eq!(acme.address(), "mem://acme");
/// # Ok(())
/// # }
/// ```
pub struct ConnectionRegistry<C, D>
where
    C: StoreConnector,
{
    connector: Arc<C>,
    directory: D,
    default_address: String,
    connect_timeout: Duration,
    connections: Arc<DashMap<String, ConnectionCacheEntry<C::Connection>>>,
    in_flight: Arc<DashMap<String, PendingConnect<C::Connection>>>,
    stats: Arc<AtomicRegistryStats>,
}

impl<C, D> ConnectionRegistry<C, D>
where
    C: StoreConnector,
    D: TenantDirectory<C::Connection>,
{
    /// Create a registry; no connection is opened until the first resolution
    pub fn new(connector: C, directory: D, config: &StoreConfig) -> Self {
        Self::with_shared_connector(Arc::new(connector), directory, config)
    }

    /// Create a registry around a connector the caller keeps a handle to
    pub fn with_shared_connector(connector: Arc<C>, directory: D, config: &StoreConfig) -> Self {
        info!(
            store = connector.name(),
            default_store = %redact_uri(&config.default_store_uri),
            "Initializing connection registry"
        );
        Self {
            connector,
            directory,
            default_address: config.default_store_uri.clone(),
            connect_timeout: config.connect_timeout,
            connections: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            stats: Arc::new(AtomicRegistryStats::default()),
        }
    }

    /// Connection for a tenant, or the default store for `None`
    ///
    /// # Errors
    ///
    /// - `TenantNotFound` if the directory has no record or the record has
    ///   no store address
    /// - `ConnectionTimeout` / `StoreUnavailable` if a connection cannot be
    ///   established or the directory cannot be read
    pub async fn resolve(
        &self,
        tenant_key: Option<&str>,
    ) -> TenancyResult<ConnectionHandle<C::Connection>> {
        match tenant_key {
            None => self.default_connection().await,
            Some(key) => self.tenant_connection(key).await,
        }
    }

    /// Connection to the statically configured default store
    ///
    /// # Errors
    ///
    /// `ConnectionTimeout` or `StoreUnavailable` if it cannot be opened.
    pub async fn default_connection(&self) -> TenancyResult<ConnectionHandle<C::Connection>> {
        self.connect_cached(&self.default_address).await
    }

    /// Connection to a tenant's dedicated store
    ///
    /// The directory is consulted on every call; only the connection is cached.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub async fn tenant_connection(
        &self,
        tenant_key: &str,
    ) -> TenancyResult<ConnectionHandle<C::Connection>> {
        if tenant_key.trim().is_empty() {
            return Err(TenancyError::InvalidArgument(
                "tenant key must not be empty".to_string(),
            ));
        }

        let default = self.default_connection().await?;
        let record = self
            .directory
            .find_by_key(&default, tenant_key)
            .await?
            .ok_or_else(|| TenancyError::TenantNotFound {
                tenant_key: tenant_key.to_string(),
            })?;

        let Some(address) = record.store_address() else {
            warn!(tenant = %tenant_key, "Tenant record has no store address");
            return Err(TenancyError::TenantNotFound {
                tenant_key: tenant_key.to_string(),
            });
        };

        if record.status == TenantStatus::Inactive {
            debug!(tenant = %tenant_key, "Resolving connection for inactive tenant");
        }

        self.connect_cached(address).await
    }

    /// Cached handle for `address`, opening it (once) if needed
    async fn connect_cached(&self, address: &str) -> TenancyResult<ConnectionHandle<C::Connection>> {
        // Fast path: no locking beyond the shard read
        if let Some(entry) = self.connections.get(address) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.handle.clone());
        }

        let pending = match self.in_flight.entry(address.to_string()) {
            Entry::Occupied(pending) => {
                self.stats.coalesced_waiters.fetch_add(1, Ordering::Relaxed);
                debug!(address = %redact_uri(address), "Joining in-flight connection attempt");
                pending.get().clone()
            }
            Entry::Vacant(slot) => {
                // An attempt may have finished between the cache miss and taking the slot
                if let Some(entry) = self.connections.get(address) {
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.handle.clone());
                }
                let attempt = self.connect_attempt(address.to_string()).boxed().shared();
                slot.insert(attempt.clone());
                attempt
            }
        };

        pending.await
    }

    /// A single bounded connection attempt that publishes its own result
    ///
    /// On success the handle is cached before the in-flight marker is
    /// removed, so every caller sees one or the other.
    fn connect_attempt(
        &self,
        address: String,
    ) -> impl Future<Output = TenancyResult<ConnectionHandle<C::Connection>>> + Send + 'static {
        let connector = Arc::clone(&self.connector);
        let connections = Arc::clone(&self.connections);
        let in_flight = Arc::clone(&self.in_flight);
        let stats = Arc::clone(&self.stats);
        let timeout = self.connect_timeout;

        async move {
            let shown_address = redact_uri(&address);
            let started = Instant::now();

            let result = match tokio::time::timeout(timeout, connector.connect(&address)).await {
                Ok(Ok(connection)) => Ok(ConnectionHandle::new(connection)),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(TenancyError::ConnectionTimeout {
                    address: shown_address.clone(),
                    timeout,
                }),
            };

            match &result {
                Ok(handle) => {
                    connections.insert(
                        address.clone(),
                        ConnectionCacheEntry {
                            key: address.clone(),
                            handle: handle.clone(),
                            created_at: SystemTime::now(),
                        },
                    );
                    stats.connections_opened.fetch_add(1, Ordering::Relaxed);
                    info!(
                        address = %shown_address,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Store connection established"
                    );
                }
                Err(err) => {
                    stats.failed_attempts.fetch_add(1, Ordering::Relaxed);
                    warn!(address = %shown_address, error = %err, "Store connection attempt failed");
                }
            }

            in_flight.remove(&address);
            result
        }
    }

    // ===== Observability =====

    /// Snapshot of every cached connection
    #[must_use]
    pub fn cached_entries(&self) -> Vec<ConnectionCacheEntry<C::Connection>> {
        self.connections.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of cached connections
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            coalesced_waiters: self.stats.coalesced_waiters.load(Ordering::Relaxed),
            connections_opened: self.stats.connections_opened.load(Ordering::Relaxed),
            failed_attempts: self.stats.failed_attempts.load(Ordering::Relaxed),
            cached_connections: self.connections.len(),
        }
    }

    /// Address of the default store
    #[must_use]
    pub fn default_address(&self) -> &str {
        &self.default_address
    }

    #[must_use]
    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryConnector, MemoryTenantDirectory};
    use crate::tenant::TenantRecord;

    const DEFAULT: &str = "mem://default";

    fn registry(connector: MemoryConnector) -> ConnectionRegistry<MemoryConnector, MemoryTenantDirectory> {
        let config = StoreConfig {
            default_store_uri: DEFAULT.to_string(),
            connect_timeout: Duration::from_secs(1),
        };
        ConnectionRegistry::new(connector, MemoryTenantDirectory, &config)
    }

    #[tokio::test]
    async fn test_default_connection_is_created_once() {
        let registry = registry(MemoryConnector::new());
        let a = registry.resolve(None).await.unwrap();
        let b = registry.resolve(None).await.unwrap();

        assert!(ConnectionHandle::ptr_eq(&a, &b));
        assert_eq!(registry.connector().attempts_for(DEFAULT), 1);
        assert_eq!(registry.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_tenants_sharing_an_address_share_a_handle() {
        let connector = MemoryConnector::new();
        let db = connector.database(DEFAULT);
        db.upsert_tenant(TenantRecord::new("acme", "mem://shared"));
        db.upsert_tenant(TenantRecord::new("acme-eu", "mem://shared"));
        let registry = registry(connector);

        let a = registry.resolve(Some("acme")).await.unwrap();
        let b = registry.resolve(Some("acme-eu")).await.unwrap();

        assert!(ConnectionHandle::ptr_eq(&a, &b));
        assert_eq!(registry.connector().attempts_for("mem://shared"), 1);
        // default + shared
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_record_without_address_is_not_found() {
        let connector = MemoryConnector::new();
        let mut record = TenantRecord::new("beta", "");
        record.store_uri = None;
        connector.database(DEFAULT).upsert_tenant(record);
        let registry = registry(connector);

        let err = registry.resolve(Some("beta")).await.unwrap_err();
        assert_eq!(
            err,
            TenancyError::TenantNotFound {
                tenant_key: "beta".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_tenant_key_is_rejected() {
        let registry = registry(MemoryConnector::new());
        assert!(matches!(
            registry.resolve(Some("")).await,
            Err(TenancyError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_attempt_can_be_retried() {
        let connector = MemoryConnector::new();
        connector.set_unreachable(DEFAULT, "connection refused");
        let registry = registry(connector);

        let err = registry.resolve(None).await.unwrap_err();
        assert!(matches!(err, TenancyError::StoreUnavailable { .. }));
        assert!(registry.in_flight.is_empty());
        assert!(registry.is_empty());

        registry.connector().set_reachable(DEFAULT);
        assert!(registry.resolve(None).await.is_ok());
        assert_eq!(registry.connector().attempts_for(DEFAULT), 2);
        assert_eq!(registry.stats().failed_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_connection_times_out() {
        let connector = MemoryConnector::new().with_latency(Duration::from_secs(5));
        let registry = registry(connector);

        let err = registry.resolve(None).await.unwrap_err();
        assert!(matches!(err, TenancyError::ConnectionTimeout { .. }));
        assert!(registry.in_flight.is_empty());
    }
}
