//! Persistent Store Implementations
//!
//! Concrete [`StoreConnector`](crate::StoreConnector) /
//! [`TenantDirectory`](crate::TenantDirectory) pairs.
//!
//! - **Memory** - embedded in-process store
//! - **Redis** - a Redis database with tenant records as JSON documents (feature: `redis`)

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use memory::{MemoryConnection, MemoryConnector, MemoryDatabase, MemoryTenantDirectory};

#[cfg(feature = "redis")]
pub use redis_store::{RedisStore, RedisStoreConnector, RedisTenantDirectory};
