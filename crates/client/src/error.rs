use thiserror::Error;

use keylock_store::StoreError;

/// Errors raised while loading configuration or building the stores.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unsupported backend `{0}`")]
    UnknownBackend(String),

    #[error("backend could not be created: {0}")]
    Store(#[from] StoreError),
}
