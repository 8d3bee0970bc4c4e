//! Per-key single-flight locking.
//!
//! The registry maps each [`CacheKey`] to a slot holding a fair (FIFO) async
//! mutex and a count of the requests currently holding or waiting for it. A
//! slot is created by its first waiter and removed by its last, so the table
//! only ever contains keys with in-flight requests.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{CacheKey, LockError};

/// How long a request waits for another request's fill before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// In-process mutual exclusion keyed by cache key, with acquisition timeout.
///
/// Cloning is cheap and shares the lock table.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use routecache::cache::{CacheKey, KeyLockRegistry};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let locks = KeyLockRegistry::new(Duration::from_millis(50));
/// let key = CacheKey::new("cached-route-GET-/x");
///
/// let held = locks.acquire(&key).await.unwrap();
/// assert!(locks.acquire(&key).await.is_err());
///
/// drop(held);
/// assert!(locks.is_empty());
/// # }
/// ```
#[derive(Clone)]
pub struct KeyLockRegistry {
    inner: Arc<Registry>,
}

struct Registry {
    slots: DashMap<CacheKey, Slot>,
    timeout: Duration,
}

struct Slot {
    lock: Arc<Mutex<()>>,
    waiters: usize,
}

impl KeyLockRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Registry {
                slots: DashMap::new(),
                timeout,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Number of keys with at least one holder or waiter.
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    /// Waits for exclusive ownership of `key`.
    ///
    /// The slot is released when the returned [`KeyGuard`] is dropped.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] when the slot is still held after the registry's
    /// timeout.
    pub async fn acquire(&self, key: &CacheKey) -> Result<KeyGuard, LockError> {
        let lock = {
            let mut slot = self.inner.slots.entry(key.clone()).or_insert_with(|| Slot {
                lock: Arc::new(Mutex::new(())),
                waiters: 0,
            });
            slot.waiters += 1;
            Arc::clone(&slot.lock)
        };

        // Created before the first await so a cancelled wait still leaves the slot.
        let membership = Membership {
            registry: Arc::clone(&self.inner),
            key: key.clone(),
        };

        match tokio::time::timeout(self.inner.timeout, lock.lock_owned()).await {
            Ok(held) => Ok(KeyGuard {
                _held: held,
                membership,
            }),
            Err(_) => Err(LockError::Timeout {
                key: key.clone(),
                waited: self.inner.timeout,
            }),
        }
    }

    /// Runs `f` while holding `key`, passing it the guard that releases the
    /// slot.
    ///
    /// `f` may move the guard elsewhere (for instance into a spawned task) to
    /// keep the slot held past its own return.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] when the slot could not be acquired; `f` is not
    /// called in that case.
    pub async fn with_lock<F, Fut, T>(&self, key: &CacheKey, f: F) -> Result<T, LockError>
    where
        F: FnOnce(KeyGuard) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.acquire(key).await?;
        Ok(f(guard).await)
    }
}

impl Default for KeyLockRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl fmt::Debug for KeyLockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLockRegistry")
            .field("timeout", &self.inner.timeout)
            .field("slots", &self.inner.slots.len())
            .finish()
    }
}

/// Exclusive hold on one cache key. Dropping it releases the slot.
pub struct KeyGuard {
    // Field order matters: the mutex is unlocked before membership is given up.
    _held: OwnedMutexGuard<()>,
    membership: Membership,
}

impl KeyGuard {
    pub fn key(&self) -> &CacheKey {
        &self.membership.key
    }

    /// Releases the slot now. Equivalent to dropping the guard.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGuard")
            .field("key", &self.membership.key)
            .finish()
    }
}

// One unit of a slot's waiter count.
struct Membership {
    registry: Arc<Registry>,
    key: CacheKey,
}

impl Drop for Membership {
    fn drop(&mut self) {
        if let Entry::Occupied(mut slot) = self.registry.slots.entry(self.key.clone()) {
            slot.get_mut().waiters -= 1;
            if slot.get().waiters == 0 {
                slot.remove();
            }
        }
    }
}
