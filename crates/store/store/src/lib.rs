//! Key-value store abstraction for keylock.
//!
//! [`KvStore`] is the byte-level client boundary the cache and lock layers
//! are written against. Backends live in their own crates
//! (`keylock-store-memory`, `keylock-store-redis`) and all run the shared
//! [`testing`] conformance suite.

pub mod error;
pub mod store;
pub mod testing;

pub use error::StoreError;
pub use store::{
    KeyTtl, KvStore, RefreshOutcome, SetCommand, SetMode, duration_millis, expiry_millis,
};
