use thiserror::Error;

/// Errors from key-value store operations.
///
/// `Connection` and `Backend` mean the store could not serve the request.
/// Nothing in keylock retries them; reconnecting is the pool's job.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),
}
