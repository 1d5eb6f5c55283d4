//! Error taxonomy
//!
//! Two families: [`CacheError`] for the ephemeral key-value surface and
//! [`TenancyError`] for tenant resolution and store connections. Both are
//! `Clone` because a single failed connection attempt is handed to every
//! caller that was coalesced onto it.

use std::time::Duration;
use thiserror::Error;

/// Result alias for cache commands
pub type CacheResult<T> = Result<T, CacheError>;

/// Result alias for tenant resolution and store connections
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Errors produced by cache commands
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The remote cache could not be reached or dropped the connection.
    ///
    /// Ordinary callers never see this: the backend downgrades to the mock
    /// store and retries. Diagnostic calls (`ping`, `test_cache`) surface it.
    #[error("cache backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Malformed TTL or key
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation against a key holding the wrong kind of value
    #[error("WRONGTYPE operation against key '{key}' holding the wrong kind of value")]
    WrongType { key: String },

    /// Server rejected the command
    #[error("cache command failed: {0}")]
    Command(String),
}

impl CacheError {
    /// Whether this error should trigger a self-downgrade to the mock store
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

#[cfg(feature = "redis")]
impl CacheError {
    /// Classify a Redis error raised while operating on `key`
    pub(crate) fn from_redis(err: &redis::RedisError, key: &str) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            return Self::BackendUnavailable(err.to_string());
        }
        if err.code() == Some("WRONGTYPE") {
            return Self::WrongType {
                key: key.to_string(),
            };
        }
        Self::Command(err.to_string())
    }
}

/// Errors produced while resolving a tenant to a store connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TenancyError {
    /// No directory record, or the record carries no store address
    #[error("tenant '{tenant_key}' not found")]
    TenantNotFound { tenant_key: String },

    /// A connection attempt exceeded its bound
    #[error("connection to {address} timed out after {timeout:?}")]
    ConnectionTimeout { address: String, timeout: Duration },

    /// The persistent store refused or failed the request
    #[error("store unavailable at {address}: {message}")]
    StoreUnavailable { address: String, message: String },

    /// Malformed tenant key or store address
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl TenancyError {
    /// Build a `StoreUnavailable` for an address, redacting any credentials
    pub fn store_unavailable(address: &str, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            address: redact_uri(address),
            message: message.into(),
        }
    }

    /// Whether a caller may retry the whole request later
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::StoreUnavailable { .. }
        )
    }
}

/// Replace the userinfo part of a URI with `***` so it can be logged
///
/// `redis://user:secret@db:6379/2` becomes `redis://***@db:6379/2`.
#[must_use]
pub fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);
    match authority.rsplit_once('@') {
        Some((_, host)) => format!("{scheme}://***@{host}{path}"),
        None => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_uri() {
        assert_eq!(
            redact_uri("redis://user:secret@db:6379/2"),
            "redis://***@db:6379/2"
        );
        assert_eq!(redact_uri("redis://db:6379"), "redis://db:6379");
        assert_eq!(
            redact_uri("mongodb://a:b@host/shop?x=y@z"),
            "mongodb://***@host/shop?x=y@z"
        );
        assert_eq!(redact_uri("not a uri"), "not a uri");
    }

    #[test]
    fn test_transient_classification() {
        let timeout = TenancyError::ConnectionTimeout {
            address: "redis://db".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_transient());
        assert!(TenancyError::store_unavailable("redis://db", "refused").is_transient());
        assert!(
            !TenancyError::TenantNotFound {
                tenant_key: "acme".into()
            }
            .is_transient()
        );
    }
}
