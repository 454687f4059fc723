//! Store-backed mutual-exclusion locks.
//!
//! - [`LockManager`] holds the acquire / release primitives: a conditional
//!   `SET NX PX` to take a lock and owner-checked compare-and-delete to
//!   release it.
//! - [`LockInterceptor`] wraps a closure in acquire, run, release, with the
//!   release guaranteed on error and panic.
//!
//! Owner tokens are encoded with the same [`Codec`](keylock_core::Codec) used
//! for cache values, so the store compares encoded bytes.

pub mod config;
pub mod error;
pub mod interceptor;
pub mod manager;

pub use config::LockConfig;
pub use error::LockError;
pub use interceptor::{LockInterceptor, LockSpec};
pub use manager::LockManager;
