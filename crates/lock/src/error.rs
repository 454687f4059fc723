use std::time::Duration;

use thiserror::Error;

use keylock_core::{CodecError, KeyError};
use keylock_store::StoreError;

/// Errors from lock operations.
///
/// Unlike the cache, the lock path fails loudly: running a critical section
/// without the lock is never a safe fallback.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("key resolution failed: {0}")]
    Key(#[from] KeyError),

    #[error("owner token could not be encoded: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Locks must expire so a crashed holder cannot block the key forever.
    #[error("lock `{0}` has no ttl")]
    NoExpiry(String),

    #[error("invalid lock definition: {0}")]
    InvalidSpec(String),

    #[error("could not acquire lock {key} within {timeout:?}")]
    AcquisitionFailed { key: String, timeout: Duration },

    #[error("lock {key} was no longer held by this owner at release")]
    ReleaseFailed { key: String },
}
