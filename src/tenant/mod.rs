//! Tenant identity
//!
//! - [`TenantResolver`] derives a tenant key from request headers
//! - [`TenantRecord`] is the directory entry mapping a key to its store

pub mod directory;
pub mod resolver;

pub use directory::{TenantRecord, TenantStatus};
pub use resolver::{HeaderSource, TenantResolver};
