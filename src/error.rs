// src/error.rs

use thiserror::Error;

/// Errors surfaced by [`KeyStore`](crate::storage::KeyStore) implementations.
///
/// These never cross the `RotationManager` public boundary: the manager
/// logs them with structured fields and degrades. A failed read becomes
/// an empty pool; a failed write keeps the in-memory state and moves on.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis pool error: {0}")]
    RedisPool(#[from] deadpool_redis::PoolError),

    #[cfg(feature = "redis")]
    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors from loading or validating [`RotationDefaults`](crate::config::RotationDefaults).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading defaults file: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlParsing(#[from] serde_yaml::Error),

    #[error("invalid value for '{field}': {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
}
