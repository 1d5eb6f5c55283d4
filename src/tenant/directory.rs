//! Tenant directory records
//!
//! Records are created by the provisioning flow and are read-only here.
//! Lookups go through a [`TenantDirectory`](crate::TenantDirectory) on the
//! default connection every time; nothing is cached at this level.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Active,
    Inactive,
}

/// Directory entry mapping a tenant key to its dedicated store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub tenant_key: String,
    #[serde(default)]
    pub display_name: String,
    /// Dedicated store address; a record without one cannot be routed
    #[serde(default)]
    pub store_uri: Option<String>,
    #[serde(default)]
    pub status: TenantStatus,
    #[serde(default)]
    pub is_deleted: bool,
}

impl TenantRecord {
    /// Active record routed to `store_uri`
    pub fn new(tenant_key: impl Into<String>, store_uri: impl Into<String>) -> Self {
        let tenant_key = tenant_key.into();
        Self {
            display_name: tenant_key.clone(),
            tenant_key,
            store_uri: Some(store_uri.into()),
            status: TenantStatus::Active,
            is_deleted: false,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    /// Store address, if the record carries a non-blank one
    #[must_use]
    pub fn store_address(&self) -> Option<&str> {
        self.store_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }

    /// Whether the tenant is active and not deleted
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.is_deleted && self.status == TenantStatus::Active
    }
}
