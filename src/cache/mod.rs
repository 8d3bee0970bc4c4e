//! Request-coalescing response cache.
//!
//! [`CacheMiddleware`] sits in front of a handler chain. Per request it:
//!
//! 1. derives a [`CacheKey`] through the [`CacheStore`];
//! 2. takes the key's slot in the [`KeyLockRegistry`], so at most one request
//!    per key runs the handler at a time;
//! 3. replays the stored [`CachedEntry`] on a hit, or runs the handler under a
//!    [`ResponseCapture`] on a miss, which stores `[200, 400)` responses for the
//!    configured lifetime and releases the slot once the write has settled.
//!
//! Waiters blocked behind a fill therefore find the fresh entry when they get
//! the slot. A waiter that times out runs the handler itself, uncached.
//!
//! Entries leave the cache only by expiring; there is no invalidation API.

mod capture;
mod config;
mod entry;
mod error;
mod key;
mod lock;
mod middleware;
mod store;

#[cfg(test)]
mod testing;

pub use capture::ResponseCapture;
pub use config::{CacheConfig, Lifetime, ResolvedConfig};
pub use entry::CachedEntry;
pub use error::{ConfigError, LockError, StoreError};
pub use key::{CacheKey, KeyPolicy};
pub use lock::{DEFAULT_LOCK_TIMEOUT, KeyGuard, KeyLockRegistry};
pub use middleware::CacheMiddleware;
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{CacheStore, DEFAULT_MAX_ENTRIES, MemoryStore};
