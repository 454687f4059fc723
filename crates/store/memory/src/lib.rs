//! In-memory key-value store for keylock.
//!
//! Useful for tests and single-process deployments. Locks taken through this
//! store only exclude callers sharing the same process.

mod store;

pub use store::MemoryKvStore;
