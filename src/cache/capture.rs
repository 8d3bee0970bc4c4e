//! Interception of the handler's terminal write on a cache miss.

use std::sync::Arc;
use std::time::Duration;

use super::{CacheKey, CacheStore, CachedEntry, KeyGuard};
use crate::Response;

/// Wraps the response of a request that missed the cache.
///
/// It owns the [`KeyGuard`] for the request's key, so whichever terminal
/// operation consumes it ([`send`](Self::send) or [`redirect`](Self::redirect))
/// is the one that releases the slot. Dropping an unused capture (handler
/// panic, cancelled request) releases it too.
///
/// The response is always handed back unchanged and without waiting for the
/// store.
pub struct ResponseCapture {
    guard: KeyGuard,
    store: Arc<dyn CacheStore>,
    lifetime: Duration,
}

impl ResponseCapture {
    pub fn new(guard: KeyGuard, store: Arc<dyn CacheStore>, lifetime: Duration) -> Self {
        Self {
            guard,
            store,
            lifetime,
        }
    }

    pub fn key(&self) -> &CacheKey {
        self.guard.key()
    }

    /// Routes `response` to [`redirect`](Self::redirect) or [`send`](Self::send).
    pub fn finish(self, response: Response) -> Response {
        if response.is_redirect() {
            self.redirect(response)
        } else {
            self.send(response)
        }
    }

    /// Stores a `[200, 400)` response in the background and releases the slot
    /// once the write settles; any other status releases it at once.
    pub fn send(self, response: Response) -> Response {
        let status = response.status();
        if !status.is_cacheable() {
            tracing::debug!(key = %self.key(), status = status.as_u16(), "response not cacheable");
            self.guard.release();
            return response;
        }

        let entry = CachedEntry::from_response(&response);
        let Self {
            guard,
            store,
            lifetime,
        } = self;

        tokio::spawn(async move {
            if let Err(e) = store.set(guard.key(), entry, lifetime).await {
                tracing::error!(key = %guard.key(), error = %e, "cannot cache route");
            }
            guard.release();
        });

        response
    }

    /// Redirects are never cached; the slot is released before the redirect
    /// goes out.
    pub fn redirect(self, response: Response) -> Response {
        tracing::debug!(key = %self.key(), "redirect is not cached");
        self.guard.release();
        response
    }
}
