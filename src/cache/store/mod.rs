//! Storage backends for cached responses.
//!
//! The middleware only talks to the [`CacheStore`] trait. Two backends ship
//! with the crate:
//!
//! - [`MemoryStore`]: process-local, built on `moka`.
//! - `RedisStore` (feature `redis`): shared across instances.
//!
//! Both hold entries in the JSON record form produced by
//! [`CachedEntry::encode`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{CacheKey, CachedEntry, KeyPolicy, StoreError};
use crate::Request;

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::{DEFAULT_MAX_ENTRIES, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Key-value backend holding one [`CachedEntry`] per [`CacheKey`], with TTL.
///
/// Implementations are shared by every in-flight request and must tolerate
/// concurrent callers. Concurrent writers for one key all carry the same
/// artifact, so last-write-wins is acceptable.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Derives the key identifying `request`. Must be a pure function of the
    /// request.
    fn derive_key(&self, request: &Request) -> CacheKey {
        CacheKey::derive(request, &KeyPolicy::default())
    }

    /// Fetches the live entry for `key`, if any. Expired entries are never
    /// returned.
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>, StoreError>;

    /// Stores `entry` under `key` for `lifetime`, replacing any existing entry.
    async fn set(
        &self,
        key: &CacheKey,
        entry: CachedEntry,
        lifetime: Duration,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    fn derive_key(&self, request: &Request) -> CacheKey {
        (**self).derive_key(request)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>, StoreError> {
        (**self).get(key).await
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: CachedEntry,
        lifetime: Duration,
    ) -> Result<(), StoreError> {
        (**self).set(key, entry, lifetime).await
    }
}
