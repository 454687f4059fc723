use serde::Deserialize;

use keylock_core::KeyRegistry;
use keylock_lock::LockConfig;
#[cfg(feature = "redis")]
use keylock_store_redis::RedisConfig;

use crate::error::ConfigError;

/// Top-level configuration, usually loaded from a TOML file.
///
/// ```toml
/// backend = "redis"
///
/// [redis]
/// url = "redis://127.0.0.1:6379"
/// prefix = "shop"
///
/// [lock]
/// acquire_timeout_ms = 500
///
/// [keys.order_detail]
/// template = "order:%s:detail"
/// ttl_millis = 60000
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeylockConfig {
    /// Which store to use: `"memory"` or `"redis"`.
    pub backend: String,

    #[cfg(feature = "redis")]
    pub redis: RedisConfig,

    pub lock: LockConfig,

    /// Named key descriptors available through
    /// [`Keylock::keys`](crate::Keylock::keys).
    pub keys: KeyRegistry,
}

impl KeylockConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }
}

impl Default for KeylockConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            #[cfg(feature = "redis")]
            redis: RedisConfig::default(),
            lock: LockConfig::default(),
            keys: KeyRegistry::default(),
        }
    }
}
