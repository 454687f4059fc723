use std::time::Duration;

use serde::Deserialize;

/// Defaults applied to locks that do not set their own timings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lock TTL in milliseconds.
    pub default_ttl_ms: u64,

    /// How long [`try_acquire`](crate::LockManager::try_acquire) keeps
    /// retrying, in milliseconds.
    pub acquire_timeout_ms: u64,

    /// Upper bound on the pause between acquisition attempts, in milliseconds.
    pub poll_interval_ms: u64,
}

impl LockConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 1_000,
            acquire_timeout_ms: 3_000,
            poll_interval_ms: 50,
        }
    }
}
