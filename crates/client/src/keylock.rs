use std::sync::Arc;

use tracing::info;

use keylock_cache::CacheStore;
use keylock_core::{KeyDescriptor, KeyError, KeyRegistry};
use keylock_lock::{LockConfig, LockInterceptor, LockManager, LockSpec};
use keylock_store::KvStore;
use keylock_store_memory::MemoryKvStore;
#[cfg(feature = "redis")]
use keylock_store_redis::RedisKvStore;

use crate::config::KeylockConfig;
use crate::error::ConfigError;

/// Create the store selected by `config.backend`.
pub fn create_store(config: &KeylockConfig) -> Result<Arc<dyn KvStore>, ConfigError> {
    let store: Arc<dyn KvStore> = match config.backend.as_str() {
        "memory" => Arc::new(MemoryKvStore::new()),
        #[cfg(feature = "redis")]
        "redis" => Arc::new(RedisKvStore::new(&config.redis)?),
        other => return Err(ConfigError::UnknownBackend(other.to_owned())),
    };
    info!(backend = %config.backend, "key-value store ready");
    Ok(store)
}

/// Cache, locks and named keys sharing one store.
pub struct Keylock {
    cache: CacheStore,
    locks: Arc<LockManager>,
    interceptor: LockInterceptor,
    lock_config: LockConfig,
    keys: KeyRegistry,
}

impl Keylock {
    pub fn from_config(config: &KeylockConfig) -> Result<Self, ConfigError> {
        let store = create_store(config)?;
        Ok(Self::with_store(store, config))
    }

    /// Build on an existing store, ignoring `config.backend`.
    pub fn with_store(store: Arc<dyn KvStore>, config: &KeylockConfig) -> Self {
        let locks = Arc::new(LockManager::from_config(Arc::clone(&store), &config.lock));
        Self {
            cache: CacheStore::new(store),
            interceptor: LockInterceptor::new(Arc::clone(&locks)),
            locks,
            lock_config: config.lock.clone(),
            keys: config.keys.clone(),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn interceptor(&self) -> &LockInterceptor {
        &self.interceptor
    }

    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    /// Look up a named key descriptor.
    pub fn key(&self, name: &str) -> Result<&KeyDescriptor, KeyError> {
        self.keys.require(name)
    }

    /// A [`LockSpec`] for the named key, using its TTL as the lock expiry
    /// and the configured acquire timeout.
    pub fn lock_spec(&self, name: &str) -> Result<LockSpec, KeyError> {
        let key = self.keys.require(name)?.clone();
        Ok(LockSpec::for_key(key, &self.lock_config))
    }
}
