use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::Expiry;
use moka::future::Cache;

use super::CacheStore;
use crate::Request;
use crate::cache::{CacheKey, CachedEntry, KeyPolicy, StoreError};

/// Default capacity of a [`MemoryStore`].
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// In-process store with a per-entry time-to-live.
///
/// Every entry carries its own lifetime; overwriting an entry restarts its
/// clock. When the capacity is reached moka evicts entries on its own, which
/// callers observe as ordinary misses.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use routecache::cache::{CacheKey, CacheStore, CachedEntry, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new(100);
/// let key = CacheKey::new("cached-route-GET-/x");
/// let entry = CachedEntry { body: Bytes::from_static(b"hi"), content_type: None, status_code: Some(200), location: None };
///
/// store.set(&key, entry.clone(), Duration::from_secs(60)).await.unwrap();
/// assert_eq!(store.get(&key).await.unwrap(), Some(entry));
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    records: Cache<CacheKey, Record>,
    policy: KeyPolicy,
}

#[derive(Clone)]
struct Record {
    bytes: Bytes,
    lifetime: Duration,
}

struct RecordLifetime;

impl Expiry<CacheKey, Record> for RecordLifetime {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        record: &Record,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(record.lifetime)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        record: &Record,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(record.lifetime)
    }
}

impl MemoryStore {
    pub fn new(max_entries: u64) -> Self {
        Self::with_policy(max_entries, KeyPolicy::default())
    }

    /// Creates a store that derives keys with `policy`.
    pub fn with_policy(max_entries: u64, policy: KeyPolicy) -> Self {
        let records = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(RecordLifetime)
            .build();
        Self { records, policy }
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn derive_key(&self, request: &Request) -> CacheKey {
        CacheKey::derive(request, &self.policy)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>, StoreError> {
        match self.records.get(key).await {
            Some(record) => CachedEntry::decode(&record.bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: CachedEntry,
        lifetime: Duration,
    ) -> Result<(), StoreError> {
        let bytes = entry.encode()?;
        self.records
            .insert(key.clone(), Record { bytes, lifetime })
            .await;
        Ok(())
    }
}
