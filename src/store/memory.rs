//! Memory Store - In-Process Persistent Store
//!
//! An embedded stand-in for the persistent store: every address names an
//! in-process database holding a tenant collection and a document map.
//! Useful for single-node development and for exercising the registry
//! without a live server.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{TenancyError, TenancyResult, redact_uri};
use crate::tenant::TenantRecord;
use crate::traits::{StoreConnector, TenantDirectory};

/// Database living at one store address
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tenants: DashMap<String, TenantRecord>,
    documents: DashMap<String, Value>,
}

impl MemoryDatabase {
    /// Add or replace a tenant record
    pub fn upsert_tenant(&self, record: TenantRecord) {
        self.tenants.insert(record.tenant_key.clone(), record);
    }

    /// Remove a tenant record
    pub fn remove_tenant(&self, tenant_key: &str) -> Option<TenantRecord> {
        self.tenants.remove(tenant_key).map(|(_, record)| record)
    }

    pub fn put_document(&self, id: impl Into<String>, document: Value) {
        self.documents.insert(id.into(), document);
    }

    #[must_use]
    pub fn document(&self, id: &str) -> Option<Value> {
        self.documents.get(id).map(|doc| doc.value().clone())
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }
}

/// One established connection; distinct connections may share a database
#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    address: String,
    database: Arc<MemoryDatabase>,
}

impl MemoryConnection {
    /// Sequence number of this connection within its connector
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Address this connection was opened for
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }
}

/// Connector that opens [`MemoryConnection`]s
///
/// Counts every attempt (per address and in total), and can simulate
/// connection latency and unreachable addresses.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    databases: DashMap<String, Arc<MemoryDatabase>>,
    unreachable: DashMap<String, String>,
    attempts_by_address: DashMap<String, u64>,
    attempts: AtomicU64,
    latency: Option<Duration>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every connection attempt by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Database at `address`, created on first access
    pub fn database(&self, address: &str) -> Arc<MemoryDatabase> {
        Arc::clone(self.databases.entry(address.to_string()).or_default().value())
    }

    /// Make connection attempts to `address` fail with `message`
    pub fn set_unreachable(&self, address: &str, message: impl Into<String>) {
        self.unreachable.insert(address.to_string(), message.into());
    }

    /// Let connection attempts to `address` succeed again
    pub fn set_reachable(&self, address: &str) {
        self.unreachable.remove(address);
    }

    /// Total connection attempts
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Connection attempts for one address
    #[must_use]
    pub fn attempts_for(&self, address: &str) -> u64 {
        self.attempts_by_address
            .get(address)
            .map_or(0, |count| *count.value())
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, address: &str) -> TenancyResult<MemoryConnection> {
        let id = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .attempts_by_address
            .entry(address.to_string())
            .or_insert(0) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(message) = self.unreachable.get(address) {
            return Err(TenancyError::store_unavailable(address, message.value().clone()));
        }

        debug!(address = %redact_uri(address), id, "[Memory] Opened store connection");
        Ok(MemoryConnection {
            id,
            address: address.to_string(),
            database: self.database(address),
        })
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

/// Tenant directory over a [`MemoryConnection`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTenantDirectory;

#[async_trait]
impl TenantDirectory<MemoryConnection> for MemoryTenantDirectory {
    async fn find_by_key(
        &self,
        conn: &MemoryConnection,
        tenant_key: &str,
    ) -> TenancyResult<Option<TenantRecord>> {
        Ok(conn
            .database
            .tenants
            .get(tenant_key)
            .map(|record| record.value().clone())
            .filter(|record| !record.is_deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connections_share_database() {
        let connector = MemoryConnector::new();
        let a = connector.connect("mem://shop").await.unwrap();
        let b = connector.connect("mem://shop").await.unwrap();

        assert_ne!(a.id(), b.id());
        assert!(Arc::ptr_eq(a.database(), b.database()));
        assert_eq!(connector.attempts_for("mem://shop"), 2);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_address() {
        let connector = MemoryConnector::new();
        connector.set_unreachable("mem://down", "connection refused");

        let err = connector.connect("mem://down").await.unwrap_err();
        assert!(matches!(err, TenancyError::StoreUnavailable { .. }));

        connector.set_reachable("mem://down");
        assert!(connector.connect("mem://down").await.is_ok());
    }

    #[tokio::test]
    async fn test_directory_hides_deleted_records() {
        let connector = MemoryConnector::new();
        let db = connector.database("mem://default");
        db.upsert_tenant(TenantRecord::new("acme", "mem://acme"));
        db.upsert_tenant(TenantRecord::new("gone", "mem://gone").deleted());

        let conn = connector.connect("mem://default").await.unwrap();
        let directory = MemoryTenantDirectory;
        assert!(directory.find_by_key(&conn, "acme").await.unwrap().is_some());
        assert!(directory.find_by_key(&conn, "gone").await.unwrap().is_none());
        assert!(directory.find_by_key(&conn, "nobody").await.unwrap().is_none());
    }
}
