//! Store-backed locks and keyed caching.
//!
//! Load a [`KeylockConfig`], build a [`Keylock`], then use its
//! [`cache`](Keylock::cache), [`locks`](Keylock::locks) and
//! [`interceptor`](Keylock::interceptor). The building blocks are re-exported
//! for code that wires them by hand.

pub mod config;
pub mod error;
pub mod keylock;

pub use config::KeylockConfig;
pub use error::ConfigError;
pub use keylock::{Keylock, create_store};

pub use keylock_cache::{CacheError, CacheStore};
pub use keylock_core::{
    BatchGet, BatchSet, Codec, CodecError, Expiry, JsonCodec, KeyDescriptor, KeyError,
    KeyRegistry, KeySpec, LockHandle, NO_EXPIRY, generate_owner_token, jittered_ttl_millis,
};
pub use keylock_lock::{LockConfig, LockError, LockInterceptor, LockManager, LockSpec};
pub use keylock_store::{KeyTtl, KvStore, RefreshOutcome, StoreError};
pub use keylock_store_memory::MemoryKvStore;
#[cfg(feature = "redis")]
pub use keylock_store_redis::{RedisConfig, RedisKvStore};
