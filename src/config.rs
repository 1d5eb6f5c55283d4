//! Configuration
//!
//! Every setting has a default and can be overridden from the environment
//! (`TenancyConfig::from_env`). The structs also deserialize with serde so a
//! host application can embed them in its own config file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Default remote cache address
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default persistent store address (the global/default tenant store)
pub const DEFAULT_STORE_URI: &str = "redis://127.0.0.1:6379/0";

/// Default explicit tenant header
pub const DEFAULT_TENANT_HEADER: &str = "x-tenant";

/// Remote cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Start in enabled state; `false` keeps every command on the mock store
    pub enabled: bool,
    /// Remote cache URL
    pub redis_url: String,
    /// Bound on a single remote connection attempt
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
    /// Mock store sweep period; `None` disables the sweeper
    #[serde(with = "optional_duration_secs")]
    pub sweep_interval: Option<Duration>,
    /// After a failure-triggered downgrade, retry the remote this long later.
    /// `None` stays on the mock store until `enable()` is called.
    #[serde(with = "optional_duration_secs")]
    pub recovery_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            connect_timeout: Duration::from_secs(2),
            sweep_interval: Some(Duration::from_secs(60)),
            recovery_interval: None,
        }
    }
}

impl CacheConfig {
    /// Configuration that never touches a remote cache
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Persistent store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Address of the default store, which also holds the tenant directory
    pub default_store_uri: String,
    /// Bound on a single store connection attempt
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_store_uri: DEFAULT_STORE_URI.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Tenant resolution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Header whose value, when present, is taken as the tenant key verbatim
    pub tenant_header: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tenant_header: DEFAULT_TENANT_HEADER.to_string(),
        }
    }
}

/// All settings for a `TenancySystem`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TenancyConfig {
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub resolver: ResolverConfig,
}

impl TenancyConfig {
    /// Load configuration from environment variables
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `CACHE_ENABLED` | `true` |
    /// | `REDIS_URL` | `redis://127.0.0.1:6379` |
    /// | `CACHE_CONNECT_TIMEOUT_MS` | `2000` |
    /// | `CACHE_SWEEP_INTERVAL_SECS` | `60` (`0` disables) |
    /// | `CACHE_RECOVERY_INTERVAL_SECS` | unset |
    /// | `DEFAULT_STORE_URI` | `redis://127.0.0.1:6379/0` |
    /// | `STORE_CONNECT_TIMEOUT_MS` | `10000` |
    /// | `TENANT_HEADER` | `x-tenant` |
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("CACHE_ENABLED") {
            config.cache.enabled = parse_bool(&raw)
                .with_context(|| format!("Invalid CACHE_ENABLED value: {raw}"))?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            config.cache.redis_url = url;
        }
        if let Some(raw) = lookup("CACHE_CONNECT_TIMEOUT_MS") {
            config.cache.connect_timeout = Duration::from_millis(
                raw.parse()
                    .with_context(|| format!("Invalid CACHE_CONNECT_TIMEOUT_MS value: {raw}"))?,
            );
        }
        if let Some(raw) = lookup("CACHE_SWEEP_INTERVAL_SECS") {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("Invalid CACHE_SWEEP_INTERVAL_SECS value: {raw}"))?;
            config.cache.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("CACHE_RECOVERY_INTERVAL_SECS") {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("Invalid CACHE_RECOVERY_INTERVAL_SECS value: {raw}"))?;
            config.cache.recovery_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(uri) = lookup("DEFAULT_STORE_URI") {
            config.store.default_store_uri = uri;
        }
        if let Some(raw) = lookup("STORE_CONNECT_TIMEOUT_MS") {
            config.store.connect_timeout = Duration::from_millis(
                raw.parse()
                    .with_context(|| format!("Invalid STORE_CONNECT_TIMEOUT_MS value: {raw}"))?,
            );
        }
        if let Some(header) = lookup("TENANT_HEADER") {
            config.resolver.tenant_header = header.to_ascii_lowercase();
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("expected a boolean, got '{other}'")),
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs))
    }
}
