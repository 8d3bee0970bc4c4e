//! In-test store with failure injection, shared by the cache module tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{CacheKey, CacheStore, CachedEntry, KeyLockRegistry, StoreError};

#[derive(Default)]
pub(crate) struct FakeStore {
    entries: Mutex<HashMap<CacheKey, CachedEntry>>,
    lifetimes: Mutex<Vec<Duration>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    gate: Option<Notify>,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A store whose writes block until [`open_gate`](Self::open_gate).
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::default()
        }
    }

    pub(crate) fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub(crate) fn entry(&self, key: &str) -> Option<CachedEntry> {
        self.entries.lock().unwrap().get(&CacheKey::new(key)).cloned()
    }

    pub(crate) fn lifetimes(&self) -> Vec<Duration> {
        self.lifetimes.lock().unwrap().clone()
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for FakeStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("read refused".into()));
        }
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(
        &self,
        key: &CacheKey,
        entry: CachedEntry,
        lifetime: Duration,
    ) -> Result<(), StoreError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write refused".into()));
        }
        self.lifetimes.lock().unwrap().push(lifetime);
        self.entries.lock().unwrap().insert(key.clone(), entry);
        Ok(())
    }
}

/// Routes log output through the test harness; `RUST_LOG=routecache=debug`
/// shows the cache decisions.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits for background cache writes to release every slot.
pub(crate) async fn wait_until_unlocked(locks: &KeyLockRegistry) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !locks.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("cache slots were not released");
}
