use std::time::Duration;

use thiserror::Error;

use super::CacheKey;

/// Failure to take the per-key slot in the [`KeyLockRegistry`](super::KeyLockRegistry).
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for cache key `{key}`")]
    Timeout { key: CacheKey, waited: Duration },
}

/// Errors raised by a [`CacheStore`](super::CacheStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode cached entry: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode cached entry: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("cache backend unavailable: {0}")]
    Backend(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Invalid cache configuration, reported once at setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration `{input}`: {source}")]
    InvalidDuration {
        input: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}
