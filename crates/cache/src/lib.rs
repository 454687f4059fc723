//! Keyed cache reads and writes for keylock.
//!
//! [`CacheStore`] applies one naming and expiry policy to every entry: keys
//! come from a [`KeySpec`](keylock_core::KeySpec) template, TTLs from the
//! descriptor unless overridden, values go through a
//! [`Codec`](keylock_core::Codec). The cache is best-effort: misses, negative
//! TTLs and unencodable values show up as `None` / `false`, not errors.

pub mod cache;
pub mod error;

pub use cache::CacheStore;
pub use error::CacheError;
