//! Redis key-value store backend for keylock.
//!
//! [`RedisKvStore`] implements [`KvStore`] over a `deadpool-redis` pool.
//! Conditional operations (`SET NX`, compare-and-delete, compare-and-expire,
//! set-or-refresh) execute atomically on the server, either as a single
//! command or as a Lua script.
//!
//! # Lock Consistency
//!
//! | Deployment | Mutual Exclusion | Notes |
//! |------------|------------------|-------|
//! | Single instance | Strong | `SET NX` is serialized by the server |
//! | Sentinel / Cluster | Weak | A lock written to a primary that fails before replicating can be granted again |
//!
//! # Example
//!
//! ```ignore
//! use keylock_store_redis::{RedisConfig, RedisKvStore};
//!
//! let store = RedisKvStore::new(&RedisConfig::new("redis://localhost:6379"))?;
//! ```
//!
//! [`KvStore`]: keylock_store::KvStore

mod config;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisKvStore;
