//! Cache Backend Implementations
//!
//! The two concrete implementations of [`CacheCommands`](crate::CacheCommands).
//!
//! # Available Backends
//!
//! - **Mock** - In-process `DashMap` store used whenever the remote cache is
//!   disabled or unreachable
//! - **Redis** - The real remote cache (feature: `redis`)
//!
//! # Usage
//!
//! ```rust,no_run
//! use storefront_tenancy::backends::{MockStore, RedisConnector};
//! use std::time::Duration;
//!
//! let mock = MockStore::new();
//! let connector = RedisConnector::new("redis://localhost:6379", Duration::from_secs(2));
//! ```

pub mod mock_store;

#[cfg(feature = "redis")]
pub mod redis_client;

pub use mock_store::{GlobPattern, MockEntry, MockStore, MockValue, Sweeper};

#[cfg(feature = "redis")]
pub use redis_client::{RedisCacheClient, RedisConnector};
