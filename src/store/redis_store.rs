//! Redis Store - Persistent Store over Redis
//!
//! Treats a (persistence-enabled) Redis database as the persistent store.
//! Tenant records live as JSON documents under `tenant:<key>` in the
//! default database.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::fmt;
use tracing::{debug, info};

use crate::error::{TenancyError, TenancyResult, redact_uri};
use crate::tenant::TenantRecord;
use crate::traits::{StoreConnector, TenantDirectory};

/// Established store connection
#[derive(Clone)]
pub struct RedisStore {
    address: String,
    conn_manager: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Address with credentials redacted
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// A connection for issuing commands directly
    #[must_use]
    pub fn connection(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }
}

/// Opens [`RedisStore`] connections
///
/// The registry bounds each call with its own timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisStoreConnector;

#[async_trait]
impl StoreConnector for RedisStoreConnector {
    type Connection = RedisStore;

    async fn connect(&self, address: &str) -> TenancyResult<RedisStore> {
        let shown_address = redact_uri(address);
        info!(address = %shown_address, "Connecting persistent store");

        let client = Client::open(address).map_err(|e| {
            TenancyError::InvalidArgument(format!("invalid store address {shown_address}: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| TenancyError::store_unavailable(address, e.to_string()))?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TenancyError::store_unavailable(address, e.to_string()))?;

        info!(address = %shown_address, "Persistent store connected");
        Ok(RedisStore {
            address: shown_address,
            conn_manager,
        })
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}

/// Tenant directory stored as JSON documents in the default database
#[derive(Debug, Clone)]
pub struct RedisTenantDirectory {
    key_prefix: String,
}

impl Default for RedisTenantDirectory {
    fn default() -> Self {
        Self::new("tenant:")
    }
}

impl RedisTenantDirectory {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
        }
    }

    fn record_key(&self, tenant_key: &str) -> String {
        format!("{}{tenant_key}", self.key_prefix)
    }

    /// Write a record; used by provisioning tools and tests
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the write fails.
    pub async fn upsert(&self, conn: &RedisStore, record: &TenantRecord) -> TenancyResult<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| TenancyError::InvalidArgument(format!("unserializable record: {e}")))?;
        let _: () = conn
            .connection()
            .set(self.record_key(&record.tenant_key), json)
            .await
            .map_err(|e| TenancyError::store_unavailable(conn.address(), e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory<RedisStore> for RedisTenantDirectory {
    async fn find_by_key(
        &self,
        conn: &RedisStore,
        tenant_key: &str,
    ) -> TenancyResult<Option<TenantRecord>> {
        let raw: Option<String> = conn
            .connection()
            .get(self.record_key(tenant_key))
            .await
            .map_err(|e| TenancyError::store_unavailable(conn.address(), e.to_string()))?;

        let Some(raw) = raw else {
            debug!(tenant = %tenant_key, "[Redis] No tenant record");
            return Ok(None);
        };

        let record: TenantRecord = serde_json::from_str(&raw).map_err(|e| {
            TenancyError::store_unavailable(
                conn.address(),
                format!("corrupt record for tenant '{tenant_key}': {e}"),
            )
        })?;

        Ok((!record.is_deleted).then_some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_prefix() {
        assert_eq!(RedisTenantDirectory::default().record_key("acme"), "tenant:acme");
        assert_eq!(RedisTenantDirectory::new("t/").record_key("acme"), "t/acme");
    }

    #[tokio::test]
    async fn test_invalid_address_is_rejected() {
        let result = RedisStoreConnector.connect("definitely not a url").await;
        assert!(matches!(result, Err(TenancyError::InvalidArgument(_))));
    }
}
