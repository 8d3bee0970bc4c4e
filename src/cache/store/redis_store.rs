use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::CacheStore;
use crate::Request;
use crate::cache::{CacheKey, CachedEntry, KeyPolicy, StoreError};

/// Store shared by every instance pointed at the same Redis server.
///
/// Entries are written with `PSETEX`, so expiry is enforced by Redis itself.
/// The connection manager reconnects on its own; a failed call surfaces as
/// [`StoreError::Redis`] and the middleware treats it as a miss.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    policy: KeyPolicy,
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_policy(url, KeyPolicy::default()).await
    }

    pub async fn connect_with_policy(url: &str, policy: KeyPolicy) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::debug!(url, "connected to redis cache store");
        Ok(Self { conn, policy })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn derive_key(&self, request: &Request) -> CacheKey {
        CacheKey::derive(request, &self.policy)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let record: Option<Vec<u8>> = conn.get(key.as_str()).await?;
        record.map(|bytes| CachedEntry::decode(&bytes)).transpose()
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: CachedEntry,
        lifetime: Duration,
    ) -> Result<(), StoreError> {
        let record = entry.encode()?;
        // PSETEX rejects a zero expiry.
        let millis = u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key.as_str(), record.as_ref(), millis)
            .await?;
        Ok(())
    }
}
