use std::time::Duration;

use uuid::Uuid;

/// A lock held for the duration of a critical section.
///
/// Nothing beyond the store entry itself is persisted; dropping the handle
/// does not release the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    resolved_key: String,
    owner_token: String,
    ttl: Duration,
}

impl LockHandle {
    pub fn new(
        resolved_key: impl Into<String>,
        owner_token: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            resolved_key: resolved_key.into(),
            owner_token: owner_token.into(),
            ttl,
        }
    }

    pub fn resolved_key(&self) -> &str {
        &self.resolved_key
    }

    pub fn owner_token(&self) -> &str {
        &self.owner_token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Generate a random owner token (a UUID v4 without hyphens).
pub fn generate_owner_token() -> String {
    Uuid::new_v4().simple().to_string()
}
