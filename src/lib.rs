//! Storefront Tenancy
//!
//! Multi-tenant plumbing for a storefront backend:
//! - **Tenant resolution**: explicit `x-tenant` header, else the host's subdomain
//! - **Connection registry**: one shared store connection per address,
//!   concurrent first requests coalesced into a single attempt
//! - **Fallback cache**: Redis when reachable, an in-process mock store
//!   otherwise, switched transparently at runtime
//! - **Key categories**: OTP, session and token keys with their TTL policies
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use storefront_tenancy::{Keyspace, TenancySystem};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let system = TenancySystem::from_env()?;
//!
//!     // Route a request to its tenant's store
//!     let headers = [("host", "acme.shop.example.com")];
//!     let store = system.connection_for(&headers[..]).await?;
//!     tracing::info!(address = store.address(), "Routed request");
//!
//!     // Cache an OTP; works whether or not Redis is up
//!     system.cache().put(Keyspace::Otp, "+15550100", "493021").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! headers → TenantResolver → tenant key → ConnectionRegistry → ConnectionHandle
//!                                              │ (miss)
//!                                              └─ TenantDirectory on default store
//!
//! CacheFacade → CacheBackend ─┬─ remote client (Enabled-Connected)
//!                             └─ MockStore     (Disabled / after a failure)
//! ```

use std::sync::Arc;
use tracing::{info, warn};

pub mod backends;
pub mod builder;
pub mod cache_backend;
pub mod cache_facade;
pub mod config;
pub mod error;
pub mod keyspace;
pub mod registry;
pub mod store;
pub mod tenant;
pub mod traits;

pub use backends::{MockStore, Sweeper};
#[cfg(feature = "redis")]
pub use backends::{RedisCacheClient, RedisConnector};
pub use builder::TenancySystemBuilder;
pub use cache_backend::{CacheBackend, CacheBackendStats, CacheStatus};
pub use cache_facade::CacheFacade;
pub use config::{CacheConfig, ResolverConfig, StoreConfig, TenancyConfig};
pub use error::{CacheError, CacheResult, TenancyError, TenancyResult, redact_uri};
pub use keyspace::{KeyPolicy, Keyspace};
pub use registry::{ConnectionCacheEntry, ConnectionHandle, ConnectionRegistry, RegistryStats};
pub use tenant::{HeaderSource, TenantRecord, TenantResolver, TenantStatus};
pub use traits::{CacheCommands, RemoteConnector, StoreConnector, TenantDirectory};

// Re-export async_trait for implementors of the traits above
pub use async_trait::async_trait;

/// Tenancy system backed by Redis for both the cache and the persistent store
#[cfg(feature = "redis")]
pub type RedisTenancySystem =
    TenancySystem<store::RedisStoreConnector, store::RedisTenantDirectory>;

/// Main entry point: resolver, connection registry and cache in one bundle
///
/// Cloning shares the underlying registry and cache.
pub struct TenancySystem<C, D>
where
    C: StoreConnector,
{
    resolver: TenantResolver,
    registry: Arc<ConnectionRegistry<C, D>>,
    cache: CacheFacade,
}

impl<C, D> Clone for TenancySystem<C, D>
where
    C: StoreConnector,
{
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            registry: Arc::clone(&self.registry),
            cache: self.cache.clone(),
        }
    }
}

#[cfg(feature = "redis")]
impl TenancySystem<store::RedisStoreConnector, store::RedisTenantDirectory> {
    /// Build a Redis-backed system from environment variables
    ///
    /// Nothing is connected yet: the default store is dialled on the first
    /// resolution and the cache on its first command.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;

        let config = TenancyConfig::from_env().context("Failed to load tenancy configuration")?;
        Ok(Self::redis(&config))
    }

    /// Build a Redis-backed system from explicit configuration
    #[must_use]
    pub fn redis(config: &TenancyConfig) -> Self {
        TenancySystemBuilder::new(store::RedisStoreConnector, store::RedisTenantDirectory::default())
            .with_config(config.clone())
            .build()
    }
}

impl<C, D> TenancySystem<C, D>
where
    C: StoreConnector,
    D: TenantDirectory<C::Connection>,
{
    pub(crate) fn from_parts(
        resolver: TenantResolver,
        registry: ConnectionRegistry<C, D>,
        cache: CacheFacade,
    ) -> Self {
        Self {
            resolver,
            registry: Arc::new(registry),
            cache,
        }
    }

    /// Tenant key for a request, `None` for the default store
    pub fn resolve_tenant<H>(&self, headers: &H) -> Option<String>
    where
        H: HeaderSource + ?Sized,
    {
        self.resolver.resolve(headers)
    }

    /// Connection for `tenant_key`, or the default store for `None`
    ///
    /// # Errors
    ///
    /// See [`ConnectionRegistry::resolve`].
    pub async fn get_connection(
        &self,
        tenant_key: Option<&str>,
    ) -> TenancyResult<ConnectionHandle<C::Connection>> {
        self.registry.resolve(tenant_key).await
    }

    /// Resolve the tenant of a request and return its connection
    ///
    /// # Errors
    ///
    /// See [`ConnectionRegistry::resolve`].
    pub async fn connection_for<H>(&self, headers: &H) -> TenancyResult<ConnectionHandle<C::Connection>>
    where
        H: HeaderSource + ?Sized,
    {
        let tenant = self.resolver.resolve(headers);
        self.registry.resolve(tenant.as_deref()).await
    }

    #[must_use]
    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry<C, D>> {
        &self.registry
    }

    /// The cache; hand clones of this to other subsystems
    #[must_use]
    pub fn cache(&self) -> &CacheFacade {
        &self.cache
    }

    /// Operator view of the cache
    #[must_use]
    pub fn cache_status(&self) -> CacheStatus {
        self.cache.status()
    }

    /// Operator toggle for the remote cache
    pub async fn set_cache_enabled(&self, enabled: bool) {
        self.cache.set_enabled(enabled).await;
    }

    /// Round-trip a throwaway key through the active cache
    ///
    /// # Errors
    ///
    /// Surfaces the raw backend error rather than falling back.
    pub async fn test_cache(&self) -> CacheResult<bool> {
        self.cache.test().await
    }

    /// Check the default store and the cache
    ///
    /// Returns `true` if the default store is reachable. A cache failure is
    /// logged but tolerated, commands keep working on the mock store.
    pub async fn health_check(&self) -> bool {
        let store_ok = match self.registry.default_connection().await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "Default store health check failed");
                false
            }
        };
        let cache_ok = self.cache.ping().await.is_ok();

        if store_ok && cache_ok {
            info!("Tenancy health check passed");
        } else {
            warn!(store_ok, cache_ok, "Tenancy health check - partial failure");
        }
        store_ok
    }

    /// Stop background work and release the cache client
    ///
    /// Store connections live as long as the registry itself.
    pub async fn shutdown(&self) {
        info!("Shutting down tenancy system");
        self.cache.shutdown().await;
    }
}
