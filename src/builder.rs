//! Tenancy System Builder
//!
//! Assembles a [`TenancySystem`] from a store connector, a tenant directory
//! and configuration, with an optional custom remote cache.
//!
//! # Example: Embedded Store
//!
//! ```rust
//! use storefront_tenancy::{StoreConfig, TenancySystemBuilder};
//! use storefront_tenancy::store::{MemoryConnector, MemoryTenantDirectory};
//!
//! let system = TenancySystemBuilder::new(MemoryConnector::new(), MemoryTenantDirectory)
//!     .with_store(StoreConfig { default_store_uri: "mem://default".into(), ..StoreConfig::default() })
//!     .in_process_cache()
//!     .build();
//! ```
//!
//! # Example: Custom Remote Cache
//!
//! ```rust,ignore
//! let system = TenancySystemBuilder::new(connector, directory)
//!     .with_remote_cache(Arc::new(MyMemcachedConnector::new()))
//!     .build();
//! ```

use std::sync::Arc;
use tracing::info;

use crate::TenancySystem;
use crate::cache_backend::CacheBackend;
use crate::cache_facade::CacheFacade;
use crate::config::{CacheConfig, ResolverConfig, StoreConfig, TenancyConfig};
use crate::registry::ConnectionRegistry;
use crate::tenant::TenantResolver;
use crate::traits::{RemoteConnector, StoreConnector, TenantDirectory};

/// Which remote cache the system talks to
enum RemoteCache {
    /// Redis at `CacheConfig::redis_url`
    #[cfg(feature = "redis")]
    Redis,
    Custom(Arc<dyn RemoteConnector>),
    /// Mock store only
    InProcess,
}

/// Builder for [`TenancySystem`]
///
/// # Default Behavior
///
/// - Configuration: [`TenancyConfig::default`]
/// - Remote cache: Redis at the configured URL (feature `redis`), otherwise
///   the mock store only
pub struct TenancySystemBuilder<C, D> {
    connector: Arc<C>,
    directory: D,
    config: TenancyConfig,
    remote: RemoteCache,
}

impl<C, D> TenancySystemBuilder<C, D>
where
    C: StoreConnector,
    D: TenantDirectory<C::Connection>,
{
    /// Start a builder around a store connector and its directory
    pub fn new(connector: C, directory: D) -> Self {
        Self::with_shared_connector(Arc::new(connector), directory)
    }

    /// Like [`new`](Self::new), keeping a caller-held handle to the connector
    pub fn with_shared_connector(connector: Arc<C>, directory: D) -> Self {
        Self {
            connector,
            directory,
            config: TenancyConfig::default(),
            #[cfg(feature = "redis")]
            remote: RemoteCache::Redis,
            #[cfg(not(feature = "redis"))]
            remote: RemoteCache::InProcess,
        }
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn with_config(mut self, config: TenancyConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_cache_config(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.config.resolver = resolver;
        self
    }

    /// Use a custom remote cache instead of Redis
    #[must_use]
    pub fn with_remote_cache(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.remote = RemoteCache::Custom(connector);
        self
    }

    /// Keep every cache command in process
    #[must_use]
    pub fn in_process_cache(mut self) -> Self {
        self.remote = RemoteCache::InProcess;
        self
    }

    /// Assemble the system; nothing is connected until first use
    pub fn build(self) -> TenancySystem<C, D> {
        let Self {
            connector,
            directory,
            config,
            remote,
        } = self;

        let backend = match remote {
            #[cfg(feature = "redis")]
            RemoteCache::Redis => CacheBackend::redis(&config.cache),
            RemoteCache::Custom(remote) => CacheBackend::new(&config.cache, remote),
            RemoteCache::InProcess => CacheBackend::mock_only(&config.cache),
        };
        info!(
            store = connector.name(),
            cache_enabled = config.cache.enabled,
            tenant_header = %config.resolver.tenant_header,
            "Building tenancy system"
        );

        TenancySystem::from_parts(
            TenantResolver::from_config(&config.resolver),
            ConnectionRegistry::with_shared_connector(connector, directory, &config.store),
            CacheFacade::new(Arc::new(backend)),
        )
    }
}
