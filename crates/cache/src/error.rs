use thiserror::Error;

use keylock_core::{CodecError, KeyError};
use keylock_store::StoreError;

/// Errors from cache operations.
///
/// Misses are never errors. Encode failures on writes degrade to a `false`
/// result rather than an error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("key resolution failed: {0}")]
    Key(#[from] KeyError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
