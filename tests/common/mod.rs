//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - A scriptable fake remote cache (healthy, failing, refusing connections)
//! - A seeded in-process tenancy system
//! - Unique key generators

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use storefront_tenancy::backends::MockStore;
use storefront_tenancy::store::{MemoryConnector, MemoryTenantDirectory};
use storefront_tenancy::{
    CacheCommands, CacheConfig, CacheError, CacheFacade, CacheResult, RemoteConnector,
    StoreConfig, TenancySystem, TenancySystemBuilder, TenantRecord, async_trait,
};

pub const DEFAULT_STORE: &str = "mem://default";

/// Get Redis URL from environment or use default
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Create a test key with unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Cache config without a background sweeper, so expiry is observed purely lazily
pub fn cache_config() -> CacheConfig {
    CacheConfig {
        sweep_interval: None,
        ..CacheConfig::default()
    }
}

/// Remote cache stand-in: answers from its own store until told to fail
pub struct FakeRemote {
    data: MockStore,
    failing: AtomicBool,
    commands: AtomicU32,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: MockStore::new(),
            failing: AtomicBool::new(false),
            commands: AtomicU32::new(0),
        })
    }

    /// Make every subsequent command fail with a connection error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Commands that reached this remote (failed ones included)
    pub fn commands(&self) -> u32 {
        self.commands.load(Ordering::SeqCst)
    }

    /// Number of live keys held remotely
    pub fn len(&self) -> usize {
        self.data.len()
    }

    fn check(&self) -> CacheResult<()> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::BackendUnavailable(
                "connection reset by peer".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheCommands for FakeRemote {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        self.data.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.check()?;
        self.data.set(key, value).await
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()> {
        self.check()?;
        self.data.setex(key, ttl_secs, value).await
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        self.check()?;
        self.data.del(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<u64> {
        self.check()?;
        self.data.exists(key).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        self.check()?;
        self.data.expire(key, ttl_secs).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        self.check()?;
        self.data.ttl(key).await
    }

    async fn flushall(&self) -> CacheResult<()> {
        self.check()?;
        self.data.flushall().await
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.check()?;
        self.data.keys(pattern).await
    }

    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        self.check()?;
        self.data.hget(key, field).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> CacheResult<u64> {
        self.check()?;
        self.data.hset(key, field, value).await
    }

    async fn hdel(&self, key: &str, field: &str) -> CacheResult<u64> {
        self.check()?;
        self.data.hdel(key, field).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }

    fn name(&self) -> &'static str {
        "FakeRemote"
    }
}

/// Connector handing out one shared [`FakeRemote`]
pub struct FakeConnector {
    pub remote: Arc<FakeRemote>,
    refusing: AtomicBool,
    connects: AtomicU32,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            remote: FakeRemote::new(),
            refusing: AtomicBool::new(false),
            connects: AtomicU32::new(0),
        })
    }

    /// Connector whose every attempt is refused
    pub fn refusing() -> Arc<Self> {
        let connector = Self::new();
        connector.set_refusing(true);
        connector
    }

    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Connection attempts, refused ones included
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for FakeConnector {
    async fn connect(&self) -> CacheResult<Arc<dyn CacheCommands>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(CacheError::BackendUnavailable(
                "connection refused".to_string(),
            ));
        }
        let remote: Arc<dyn CacheCommands> = self.remote.clone();
        Ok(remote)
    }

    fn name(&self) -> &'static str {
        "Fake"
    }
}

/// Facade over a fake remote with the given config
pub fn fake_cache(config: &CacheConfig) -> (CacheFacade, Arc<FakeConnector>) {
    let connector = FakeConnector::new();
    let facade = CacheFacade::new(Arc::new(storefront_tenancy::CacheBackend::new(
        config,
        connector.clone(),
    )));
    (facade, connector)
}

/// Facade whose remote refuses every connection
pub fn unreachable_cache(config: &CacheConfig) -> (CacheFacade, Arc<FakeConnector>) {
    let (facade, connector) = fake_cache(config);
    connector.set_refusing(true);
    (facade, connector)
}

pub type MemorySystem = TenancySystem<MemoryConnector, MemoryTenantDirectory>;

/// In-process system with tenants `acme`, `beta` and a deleted `gone`
///
/// `acme-eu` shares acme's store address.
pub fn memory_system(connector: MemoryConnector) -> (MemorySystem, Arc<MemoryConnector>) {
    let connector = Arc::new(connector);
    let directory = connector.database(DEFAULT_STORE);
    directory.upsert_tenant(TenantRecord::new("acme", "mem://acme").with_display_name("Acme Ltd"));
    directory.upsert_tenant(TenantRecord::new("acme-eu", "mem://acme"));
    directory.upsert_tenant(TenantRecord::new("beta", "mem://beta"));
    directory.upsert_tenant(TenantRecord::new("gone", "mem://gone").deleted());

    let system = TenancySystemBuilder::with_shared_connector(Arc::clone(&connector), MemoryTenantDirectory)
        .with_store(StoreConfig {
            default_store_uri: DEFAULT_STORE.to_string(),
            connect_timeout: Duration::from_secs(2),
        })
        .with_cache_config(cache_config())
        .in_process_cache()
        .build();

    (system, connector)
}
