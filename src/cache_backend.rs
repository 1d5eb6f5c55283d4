//! Cache Backend - Remote/Mock Routing
//!
//! Owns the enable/disable state machine and routes every command either to
//! the remote client or to the in-process [`MockStore`].
//!
//! ```text
//!              enable()                 first command succeeds
//! Disabled ───────────────► Enabled-Disconnected ──────────────► Enabled-Connected
//!    ▲                                                                 │
//!    └──────────── disable() / connection error (self-downgrade) ◄─────┘
//! ```
//!
//! A connection error on an ordinary command downgrades to `Disabled` and
//! the command is retried on the mock store. Diagnostic calls (`ping`,
//! `round_trip`) surface the error instead.

use arc_swap::ArcSwap;
use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backends::{MockStore, Sweeper};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::traits::{CacheCommands, RemoteConnector};

/// Snapshot of the state machine
#[derive(Clone)]
struct CacheState {
    enabled: bool,
    client: Option<Arc<dyn CacheCommands>>,
    initialized: bool,
    /// Set when a failure (not `disable()`) turned the backend off
    downgraded_at: Option<Instant>,
}

impl CacheState {
    fn fresh(enabled: bool) -> Self {
        Self {
            enabled,
            client: None,
            initialized: false,
            downgraded_at: None,
        }
    }
}

/// Counters exposed through `CacheStatus`
#[derive(Debug, Default)]
struct AtomicBackendStats {
    remote_commands: AtomicU64,
    fallback_commands: AtomicU64,
    downgrades: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
}

impl AtomicBackendStats {
    fn snapshot(&self) -> CacheBackendStats {
        CacheBackendStats {
            remote_commands: self.remote_commands.load(Ordering::Relaxed),
            fallback_commands: self.fallback_commands.load(Ordering::Relaxed),
            downgrades: self.downgrades.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
        }
    }
}

/// Backend counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheBackendStats {
    /// Commands answered by the remote cache
    pub remote_commands: u64,
    /// Commands answered by the mock store
    pub fallback_commands: u64,
    /// Failure-triggered transitions to `Disabled`
    pub downgrades: u64,
    /// Successful remote connections
    pub connects: u64,
    /// Failed remote connection attempts
    pub connect_failures: u64,
}

/// Observable backend state; building it never fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub enabled: bool,
    pub connected: bool,
    pub mock_entry_count: usize,
    /// Name of the implementation currently answering commands
    pub backend: &'static str,
    pub stats: CacheBackendStats,
}

/// Route a command to the remote client, falling back to the mock store on
/// a connection error
macro_rules! route {
    ($self:ident, $op:literal, |$client:ident| $call:expr) => {{
        if let Some($client) = $self.remote().await {
            match $call.await {
                Ok(value) => {
                    $self.stats.remote_commands.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(err) if err.is_unavailable() => $self.downgrade($op, &$client, &err).await,
                Err(err) => return Err(err),
            }
        }
        $self.stats.fallback_commands.fetch_add(1, Ordering::Relaxed);
        let $client = &$self.mock;
        $call.await
    }};
}

/// Remote cache with transparent in-process fallback
///
/// Construct one per process (or per test) and share it behind an `Arc`.
/// Transitions are serialized by a single async lock; the command path reads
/// the current state without locking.
pub struct CacheBackend {
    connector: Option<Arc<dyn RemoteConnector>>,
    mock: Arc<MockStore>,
    state: ArcSwap<CacheState>,
    /// Serializes every state transition, including connection attempts
    transition: Mutex<()>,
    initially_enabled: bool,
    connect_timeout: Duration,
    recovery_interval: Option<Duration>,
    sweep_interval: Option<Duration>,
    sweeper: SyncMutex<Option<Sweeper>>,
    stats: AtomicBackendStats,
}

impl CacheBackend {
    /// Create a backend that dials `connector` lazily
    pub fn new(config: &CacheConfig, connector: Arc<dyn RemoteConnector>) -> Self {
        Self::build(config, Some(connector), config.enabled)
    }

    /// Create a backend with no remote at all; every command hits the mock store
    #[must_use]
    pub fn mock_only(config: &CacheConfig) -> Self {
        Self::build(config, None, false)
    }

    /// Create a backend for the Redis instance at `config.redis_url`
    #[cfg(feature = "redis")]
    #[must_use]
    pub fn redis(config: &CacheConfig) -> Self {
        let connector = crate::backends::RedisConnector::new(
            config.redis_url.clone(),
            config.connect_timeout,
        );
        Self::new(config, Arc::new(connector))
    }

    fn build(
        config: &CacheConfig,
        connector: Option<Arc<dyn RemoteConnector>>,
        enabled: bool,
    ) -> Self {
        Self {
            connector,
            mock: Arc::new(MockStore::new()),
            state: ArcSwap::from_pointee(CacheState::fresh(enabled)),
            transition: Mutex::new(()),
            initially_enabled: enabled,
            connect_timeout: config.connect_timeout,
            recovery_interval: config.recovery_interval,
            sweep_interval: config.sweep_interval,
            sweeper: SyncMutex::new(None),
            stats: AtomicBackendStats::default(),
        }
    }

    // ===== Lifecycle =====

    /// Whether `init` has run since construction or the last `enable()`
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.load().initialized
    }

    /// Connect the remote (if enabled) and start the mock sweeper
    ///
    /// Never fails: a connection failure downgrades to the mock store.
    pub async fn init(&self) {
        self.start_sweeper();

        let _guard = self.transition.lock().await;
        let state = self.state.load_full();
        if state.initialized {
            return;
        }

        if state.enabled && state.client.is_none() {
            // Downgrades and stores its own state on failure
            if self.connect_locked().await.is_ok() {
                return;
            }
        }

        let mut next = (*self.state.load_full()).clone();
        next.initialized = true;
        self.state.store(Arc::new(next));
    }

    /// Turn the remote on again
    ///
    /// The next command reconnects instead of reusing any earlier client.
    /// Leaving `Disabled` discards whatever the mock store accumulated, since
    /// the remote is authoritative again.
    pub async fn enable(&self) {
        let _guard = self.transition.lock().await;
        let previous = self.state.load_full();
        if !previous.enabled {
            self.mock.clear();
        }
        self.state.store(Arc::new(CacheState::fresh(true)));
        info!(was_enabled = previous.enabled, "Cache backend enabled");
    }

    /// Turn the remote off and release its client
    ///
    /// Disabling while connected clears the mock store; disabling while
    /// already on the mock store keeps its contents.
    pub async fn disable(&self) {
        let _guard = self.transition.lock().await;
        let previous = self.state.load_full();
        let was_connected = previous.client.is_some();
        if was_connected {
            self.mock.clear();
        }
        self.state.store(Arc::new(CacheState {
            enabled: false,
            client: None,
            initialized: true,
            downgraded_at: None,
        }));
        info!(was_connected, "Cache backend disabled");
    }

    /// Release the client, stop the sweeper and reset to the initial state
    pub async fn shutdown(&self) {
        let _guard = self.transition.lock().await;
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.shutdown();
        }
        self.mock.clear();
        self.state
            .store(Arc::new(CacheState::fresh(self.initially_enabled)));
        info!("Cache backend shut down");
    }

    fn start_sweeper(&self) {
        let Some(every) = self.sweep_interval else {
            return;
        };
        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_none_or(Sweeper::is_finished) {
            *slot = Some(self.mock.spawn_sweeper(every));
        }
    }

    // ===== Observability =====

    /// Current state and counters
    pub fn status(&self) -> CacheStatus {
        let state = self.state.load();
        CacheStatus {
            enabled: state.enabled,
            connected: state.client.is_some(),
            mock_entry_count: self.mock.len(),
            backend: state.client.as_ref().map_or("Mock", |client| client.name()),
            stats: self.stats.snapshot(),
        }
    }

    /// The in-process fallback store
    #[must_use]
    pub fn mock(&self) -> &Arc<MockStore> {
        &self.mock
    }

    // ===== Connection handling =====

    fn recovery_due(&self, state: &CacheState) -> bool {
        match (self.recovery_interval, state.downgraded_at) {
            (Some(interval), Some(since)) => since.elapsed() >= interval,
            _ => false,
        }
    }

    /// Remote client for an ordinary command, or `None` to use the mock store
    async fn remote(&self) -> Option<Arc<dyn CacheCommands>> {
        {
            let state = self.state.load();
            if let Some(client) = &state.client {
                return Some(Arc::clone(client));
            }
            if !state.enabled && !self.recovery_due(&state) {
                return None;
            }
        }
        self.connect(false).await.ok()
    }

    /// Remote client for a diagnostic call; connection errors are returned
    ///
    /// After a failure-triggered downgrade a diagnostic call probes the
    /// remote again. Only a manual `disable()` answers from the mock store.
    async fn diagnostic_client(&self) -> CacheResult<Arc<dyn CacheCommands>> {
        {
            let state = self.state.load();
            if let Some(client) = &state.client {
                return Ok(Arc::clone(client));
            }
            if !state.enabled && state.downgraded_at.is_none() {
                let mock: Arc<dyn CacheCommands> = self.mock.clone();
                return Ok(mock);
            }
        }
        self.connect(true).await
    }

    async fn connect(&self, probe: bool) -> CacheResult<Arc<dyn CacheCommands>> {
        let _guard = self.transition.lock().await;
        let state = self.state.load_full();
        // Another caller may have connected or downgraded while we waited
        if let Some(client) = &state.client {
            return Ok(Arc::clone(client));
        }
        let may_retry = self.recovery_due(&state) || (probe && state.downgraded_at.is_some());
        if !state.enabled && !may_retry {
            return Err(CacheError::BackendUnavailable(
                "cache backend is disabled".to_string(),
            ));
        }
        self.connect_locked().await
    }

    /// Dial the remote; caller holds the transition lock
    async fn connect_locked(&self) -> CacheResult<Arc<dyn CacheCommands>> {
        let Some(connector) = &self.connector else {
            let err = CacheError::BackendUnavailable("no remote cache configured".to_string());
            self.store_downgrade("connect", &err);
            return Err(err);
        };

        let attempt = tokio::time::timeout(self.connect_timeout, connector.connect()).await;
        let result = attempt.unwrap_or_else(|_| {
            Err(CacheError::BackendUnavailable(format!(
                "{} connection timed out after {:?}",
                connector.name(),
                self.connect_timeout
            )))
        });

        match result {
            Ok(client) => {
                self.stats.connects.fetch_add(1, Ordering::Relaxed);
                // The remote is authoritative again; outage-era writes must not resurface
                if self.state.load().downgraded_at.is_some() {
                    self.mock.clear();
                }
                self.state.store(Arc::new(CacheState {
                    enabled: true,
                    client: Some(Arc::clone(&client)),
                    initialized: true,
                    downgraded_at: None,
                }));
                info!(backend = connector.name(), "Cache backend connected");
                Ok(client)
            }
            Err(err) => {
                self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
                self.store_downgrade("connect", &err);
                Err(err)
            }
        }
    }

    /// Downgrade after `failed` reported a connection error
    ///
    /// No-op if the state already moved on to another client.
    async fn downgrade(
        &self,
        operation: &'static str,
        failed: &Arc<dyn CacheCommands>,
        err: &CacheError,
    ) {
        let _guard = self.transition.lock().await;
        let state = self.state.load();
        let is_current = state
            .client
            .as_ref()
            .is_some_and(|client| std::ptr::addr_eq(Arc::as_ptr(client), Arc::as_ptr(failed)));
        if is_current {
            self.store_downgrade(operation, err);
        }
    }

    fn store_downgrade(&self, operation: &'static str, err: &CacheError) {
        let downgrades = self.stats.downgrades.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.store(Arc::new(CacheState {
            enabled: false,
            client: None,
            initialized: true,
            downgraded_at: Some(Instant::now()),
        }));
        warn!(
            operation,
            error = %err,
            downgrades,
            "Cache backend unavailable; serving from in-process store"
        );
    }

    // ===== Commands =====

    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        validate_key(key)?;
        route!(self, "get", |client| client.get(key))
    }

    pub async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        validate_key(key)?;
        route!(self, "set", |client| client.set(key, value))
    }

    pub async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> CacheResult<()> {
        validate_key(key)?;
        validate_ttl(ttl_secs)?;
        route!(self, "setex", |client| client.setex(key, ttl_secs, value))
    }

    pub async fn del(&self, key: &str) -> CacheResult<u64> {
        validate_key(key)?;
        route!(self, "del", |client| client.del(key))
    }

    pub async fn exists(&self, key: &str) -> CacheResult<u64> {
        validate_key(key)?;
        route!(self, "exists", |client| client.exists(key))
    }

    pub async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        validate_key(key)?;
        validate_ttl(ttl_secs)?;
        route!(self, "expire", |client| client.expire(key, ttl_secs))
    }

    pub async fn ttl(&self, key: &str) -> CacheResult<i64> {
        validate_key(key)?;
        route!(self, "ttl", |client| client.ttl(key))
    }

    pub async fn flushall(&self) -> CacheResult<()> {
        route!(self, "flushall", |client| client.flushall())
    }

    pub async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        route!(self, "keys", |client| client.keys(pattern))
    }

    pub async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        validate_key(key)?;
        route!(self, "hget", |client| client.hget(key, field))
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> CacheResult<u64> {
        validate_key(key)?;
        route!(self, "hset", |client| client.hset(key, field, value))
    }

    pub async fn hdel(&self, key: &str, field: &str) -> CacheResult<u64> {
        validate_key(key)?;
        route!(self, "hdel", |client| client.hdel(key, field))
    }

    // ===== Diagnostics =====

    /// Liveness probe against whichever client is active
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the remote cannot be reached. The
    /// backend still downgrades, so ordinary commands keep working.
    pub async fn ping(&self) -> CacheResult<()> {
        let client = self.diagnostic_client().await?;
        match client.ping().await {
            Err(err) if err.is_unavailable() => {
                self.downgrade("ping", &client, &err).await;
                Err(err)
            }
            other => other,
        }
    }

    /// Write, read back and delete a throwaway key on the active client
    ///
    /// # Errors
    ///
    /// Returns the underlying error instead of falling back.
    pub async fn round_trip(&self) -> CacheResult<bool> {
        let client = self.diagnostic_client().await?;
        let key = format!("cache:selftest:{}", uuid::Uuid::new_v4());
        let token = uuid::Uuid::new_v4().to_string();

        let result = async {
            client.setex(&key, 10, &token).await?;
            let read_back = client.get(&key).await?;
            client.del(&key).await?;
            Ok::<_, CacheError>(read_back.as_deref() == Some(token.as_str()))
        }
        .await;

        match result {
            Err(err) if err.is_unavailable() => {
                self.downgrade("round_trip", &client, &err).await;
                Err(err)
            }
            Ok(ok) => {
                debug!(backend = client.name(), ok, "Cache round trip finished");
                Ok(ok)
            }
            other => other,
        }
    }
}

fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument(
            "cache key must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_ttl(ttl_secs: u64) -> CacheResult<()> {
    if ttl_secs == 0 {
        return Err(CacheError::InvalidArgument(
            "TTL must be a positive number of seconds".to_string(),
        ));
    }
    Ok(())
}
