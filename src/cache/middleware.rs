use std::sync::Arc;
use std::time::Duration;

use super::{
    CacheConfig, CacheStore, ConfigError, KeyLockRegistry, Lifetime, MemoryStore, ResponseCapture,
};
use crate::context::Context;
use crate::middleware::{BoxResponseFuture, Middleware, Next};

/// Response cache with per-key request coalescing.
///
/// For every request it derives a [`CacheKey`](super::CacheKey), takes the
/// key's slot in its [`KeyLockRegistry`] and then either replays the stored
/// response or runs the rest of the chain under a [`ResponseCapture`], which
/// stores cacheable results for `lifetime`.
///
/// Only safe methods (`GET`, `HEAD`, `OPTIONS`, `TRACE`) are coalesced and
/// cached. Any other method goes straight to the rest of the chain, since its
/// effect depends on the request body, which is not part of the key.
///
/// Every caching failure degrades to running the chain as if the cache were
/// absent:
///
/// - slot not acquired within the lock timeout → the handler runs uncached;
/// - store read fails → treated as a miss;
/// - store write fails → logged, the client already has its response.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use routecache::{Response, StatusCode};
/// use routecache::cache::{CacheMiddleware, MemoryStore};
/// use routecache::middleware::{Next, from_fn, from_middleware};
///
/// let cache = CacheMiddleware::new(MemoryStore::default(), "5 minutes").unwrap();
/// let chain = vec![
///     from_middleware(Arc::new(cache)),
///     from_fn(|_ctx| async { Response::new(StatusCode::Ok).body("expensive") }),
/// ];
/// let _next = Next::new(chain);
/// ```
pub struct CacheMiddleware {
    store: Arc<dyn CacheStore>,
    locks: KeyLockRegistry,
    lifetime: Duration,
}

impl CacheMiddleware {
    /// Creates a middleware caching into `store` for `lifetime`, with the
    /// default lock timeout.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if `lifetime` is zero or cannot be parsed.
    pub fn new(
        store: impl CacheStore + 'static,
        lifetime: impl Into<Lifetime>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            store: Arc::new(store),
            locks: KeyLockRegistry::default(),
            lifetime: lifetime.into().to_duration()?,
        })
    }

    /// Builds a middleware over a [`MemoryStore`] sized and keyed by `config`.
    pub fn from_config(config: &CacheConfig) -> Result<Self, ConfigError> {
        let resolved = config.resolve()?;
        Ok(Self {
            store: Arc::new(MemoryStore::with_policy(
                resolved.max_entries,
                resolved.key,
            )),
            locks: KeyLockRegistry::new(resolved.lock_timeout),
            lifetime: resolved.lifetime,
        })
    }

    /// Builds a middleware over `store`, taking lifetime and lock timeout from
    /// `config`. Key policy and capacity are the store's own business.
    pub fn with_store(
        store: impl CacheStore + 'static,
        config: &CacheConfig,
    ) -> Result<Self, ConfigError> {
        let resolved = config.resolve()?;
        Ok(Self {
            store: Arc::new(store),
            locks: KeyLockRegistry::new(resolved.lock_timeout),
            lifetime: resolved.lifetime,
        })
    }

    /// Uses `locks` instead of a private registry, so several middleware
    /// instances can coalesce on the same keys.
    #[must_use]
    pub fn lock_registry(mut self, locks: KeyLockRegistry) -> Self {
        self.locks = locks;
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn locks(&self) -> &KeyLockRegistry {
        &self.locks
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxResponseFuture {
        let store = Arc::clone(&self.store);
        let locks = self.locks.clone();
        let lifetime = self.lifetime;

        Box::pin(async move {
            if !ctx.request().method().is_safe() {
                return next.run(ctx).await;
            }

            let key = store.derive_key(ctx.request());
            let url = ctx.request().original_url();

            let guard = match locks.acquire(&key).await {
                Ok(guard) => guard,
                Err(e) => {
                    tracing::error!(url = %url, error = %e, "cannot serve cached route");
                    return next.run(ctx).await;
                }
            };

            let cached = store.get(&key).await.unwrap_or_else(|e| {
                tracing::error!(url = %url, error = %e, "cannot read cached route");
                None
            });

            if let Some(entry) = cached {
                tracing::debug!(url = %url, "using cached result");
                let response = entry.to_response();
                guard.release();
                return response;
            }

            tracing::debug!(url = %url, "no cached result for route");
            ctx.extensions_mut().insert(key);
            let capture = ResponseCapture::new(guard, store, lifetime);
            let response = next.run(ctx).await;
            capture.finish(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::testing::{FakeStore, init_tracing, wait_until_unlocked};
    use crate::cache::{CacheKey, KeyPolicy};
    use crate::middleware::{MiddlewareHandler, from_fn, from_middleware};
    use crate::{Request, Response, StatusCode};

    type MakeResponse = Arc<dyn Fn() -> Response + Send + Sync>;

    struct Harness {
        cache: Arc<CacheMiddleware>,
        calls: Arc<AtomicUsize>,
        handler: MiddlewareHandler,
    }

    impl Harness {
        fn new(cache: CacheMiddleware, delay: Duration, make: MakeResponse) -> Self {
            init_tracing();
            let calls = Arc::new(AtomicUsize::new(0));
            let handler = from_fn({
                let calls = Arc::clone(&calls);
                move |_ctx: Context| {
                    let calls = Arc::clone(&calls);
                    let make = Arc::clone(&make);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(delay).await;
                        make()
                    }
                }
            });
            Self {
                cache: Arc::new(cache),
                calls,
                handler,
            }
        }

        async fn get(&self, path: &str) -> Response {
            self.send(&format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"))
                .await
        }

        async fn send(&self, raw: &str) -> Response {
            let (request, _) = Request::parse(raw.as_bytes()).unwrap();
            let chain = vec![
                from_middleware(Arc::clone(&self.cache)),
                Arc::clone(&self.handler),
            ];
            Next::new(chain).run(Context::new(request)).await
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn text(status: StatusCode, body: &'static str) -> MakeResponse {
        Arc::new(move || {
            Response::new(status)
                .header("Content-Type", "text/plain")
                .body(body)
        })
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fill() {
        let harness = Arc::new(Harness::new(
            CacheMiddleware::new(MemoryStore::default(), "1m").unwrap(),
            Duration::from_millis(50),
            text(StatusCode::Ok, "hi"),
        ));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let harness = Arc::clone(&harness);
            tasks.push(tokio::spawn(async move { harness.get("/x").await }));
        }

        for task in tasks {
            let response = task.await.unwrap();
            assert_eq!(response.status(), StatusCode::Ok);
            assert_eq!(response.content_type(), Some("text/plain"));
            assert_eq!(response.payload(), b"hi");
        }
        assert_eq!(harness.calls(), 1);
    }

    #[tokio::test]
    async fn later_request_is_served_from_cache() {
        let harness = Harness::new(
            CacheMiddleware::new(MemoryStore::default(), 60_000u64).unwrap(),
            Duration::ZERO,
            text(StatusCode::Created, "made"),
        );

        let first = harness.get("/x").await;
        let second = harness.get("/x").await;

        assert_eq!(harness.calls(), 1);
        assert_eq!(first.status(), StatusCode::Created);
        assert_eq!(second.status(), StatusCode::Created);
        assert_eq!(second.content_type(), Some("text/plain"));
        assert_eq!(second.payload(), b"made");
    }

    #[tokio::test]
    async fn distinct_urls_fill_separately() {
        let harness = Harness::new(
            CacheMiddleware::new(MemoryStore::default(), "1m").unwrap(),
            Duration::ZERO,
            text(StatusCode::Ok, "page"),
        );

        harness.get("/a").await;
        harness.get("/b").await;
        harness.get("/a?page=2").await;
        harness.get("/a").await;

        assert_eq!(harness.calls(), 3);
    }

    #[tokio::test]
    async fn error_responses_are_not_cached() {
        let store = Arc::new(FakeStore::new());
        let harness = Harness::new(
            CacheMiddleware::new(Arc::clone(&store), "1m").unwrap(),
            Duration::ZERO,
            text(StatusCode::NotFound, "nope"),
        );

        assert_eq!(harness.get("/missing").await.status(), StatusCode::NotFound);
        assert_eq!(harness.get("/missing").await.status(), StatusCode::NotFound);

        assert_eq!(harness.calls(), 2);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn redirects_are_not_cached() {
        let store = Arc::new(FakeStore::new());
        let harness = Harness::new(
            CacheMiddleware::new(Arc::clone(&store), "1m").unwrap(),
            Duration::ZERO,
            Arc::new(|| Response::redirect("/z")),
        );

        let first = harness.get("/y").await;
        assert_eq!(first.status(), StatusCode::Found);
        assert_eq!(first.headers().get("location"), Some("/z"));
        harness.get("/y").await;

        assert_eq!(harness.calls(), 2);
        assert_eq!(store.writes(), 0);
        assert!(harness.cache.locks().is_empty());
    }

    #[tokio::test]
    async fn plain_3xx_is_cached_with_its_location() {
        let store = Arc::new(FakeStore::new());
        let harness = Harness::new(
            CacheMiddleware::new(Arc::clone(&store), "1m").unwrap(),
            Duration::ZERO,
            Arc::new(|| Response::new(StatusCode::MovedPermanently).header("Location", "/new")),
        );

        harness.get("/old").await;
        wait_until_unlocked(harness.cache.locks()).await;
        let replayed = harness.get("/old").await;

        assert_eq!(harness.calls(), 1);
        assert_eq!(store.writes(), 1);
        assert_eq!(replayed.status(), StatusCode::MovedPermanently);
        assert_eq!(replayed.headers().get("location"), Some("/new"));
    }

    #[tokio::test]
    async fn unsafe_methods_bypass_the_cache() {
        let store = Arc::new(FakeStore::new());
        let harness = Harness::new(
            CacheMiddleware::new(Arc::clone(&store), "1m").unwrap(),
            Duration::ZERO,
            text(StatusCode::Created, "stored"),
        );

        for body in [r#"{"n":1}"#, r#"{"n":2}"#] {
            let raw = format!(
                "POST /videos HTTP/1.1\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            assert_eq!(harness.send(&raw).await.status(), StatusCode::Created);
        }
        harness.send("DELETE /videos HTTP/1.1\r\n\r\n").await;

        assert_eq!(harness.calls(), 3);
        assert_eq!(store.reads(), 0);
        assert_eq!(store.writes(), 0);
        assert!(harness.cache.locks().is_empty());
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let harness = Harness::new(
            CacheMiddleware::new(MemoryStore::default(), "100ms").unwrap(),
            Duration::ZERO,
            text(StatusCode::Ok, "fresh"),
        );

        harness.get("/x").await;
        harness.get("/x").await;
        assert_eq!(harness.calls(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;

        harness.get("/x").await;
        assert_eq!(harness.calls(), 2);
    }

    #[tokio::test]
    async fn read_failure_falls_through_to_handler() {
        let store = Arc::new(FakeStore::new().failing_reads());
        let harness = Harness::new(
            CacheMiddleware::new(Arc::clone(&store), "1m").unwrap(),
            Duration::ZERO,
            text(StatusCode::Ok, "live"),
        );

        let response = harness.get("/x").await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.payload(), b"live");
        harness.get("/x").await;

        assert_eq!(harness.calls(), 2);
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn write_failure_does_not_reach_client() {
        let store = Arc::new(FakeStore::new().failing_writes());
        let harness = Harness::new(
            CacheMiddleware::new(Arc::clone(&store), "1m").unwrap(),
            Duration::ZERO,
            text(StatusCode::Ok, "live"),
        );

        assert_eq!(harness.get("/x").await.payload(), b"live");
        wait_until_unlocked(harness.cache.locks()).await;
        assert_eq!(harness.get("/x").await.payload(), b"live");
        wait_until_unlocked(harness.cache.locks()).await;

        assert_eq!(harness.calls(), 2);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn lock_timeout_degrades_to_pass_through() {
        let store = Arc::new(FakeStore::new());
        let locks = KeyLockRegistry::new(Duration::from_millis(30));
        let harness = Harness::new(
            CacheMiddleware::new(Arc::clone(&store), "1m")
                .unwrap()
                .lock_registry(locks.clone()),
            Duration::ZERO,
            text(StatusCode::Ok, "uncached"),
        );

        let held = locks
            .acquire(&CacheKey::new("cached-route-GET-/x"))
            .await
            .unwrap();

        let response = harness.get("/x").await;
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.payload(), b"uncached");
        assert_eq!(harness.calls(), 1);
        assert_eq!(store.reads(), 0);
        assert_eq!(store.writes(), 0);

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_gives_up_on_slow_fill() {
        let cache = CacheMiddleware::with_store(
            MemoryStore::default(),
            &CacheConfig::new("1m").lock_timeout("30ms"),
        )
        .unwrap();
        let harness = Arc::new(Harness::new(
            cache,
            Duration::from_millis(200),
            text(StatusCode::Ok, "slow"),
        ));

        let first = tokio::spawn({
            let harness = Arc::clone(&harness);
            async move { harness.get("/slow").await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = harness.get("/slow").await;

        assert_eq!(second.payload(), b"slow");
        assert_eq!(first.await.unwrap().payload(), b"slow");
        assert_eq!(harness.calls(), 2);
    }

    #[tokio::test]
    async fn handler_sees_its_cache_key_on_miss() {
        let cache = Arc::new(
            CacheMiddleware::from_config(
                &CacheConfig::new("1m").key_policy(KeyPolicy::new().include_query(false)),
            )
            .unwrap(),
        );
        let handler = from_fn(|ctx: Context| async move {
            let key = ctx
                .extensions()
                .get::<CacheKey>()
                .map(ToString::to_string)
                .unwrap_or_default();
            Response::new(StatusCode::Ok).body(key)
        });

        let (request, _) = Request::parse(b"GET /k?x=1 HTTP/1.1\r\n\r\n").unwrap();
        let response = Next::new(vec![from_middleware(cache), handler])
            .run(Context::new(request))
            .await;

        assert_eq!(response.payload(), b"cached-route-GET-/k");
    }

    #[tokio::test]
    async fn panicking_handler_releases_its_slot() {
        let cache = Arc::new(CacheMiddleware::new(MemoryStore::default(), "1m").unwrap());
        let chain = vec![
            from_middleware(Arc::clone(&cache)),
            from_fn(|_ctx: Context| async move {
                if true {
                    panic!("handler blew up");
                }
                Response::new(StatusCode::Ok)
            }),
        ];

        let (request, _) = Request::parse(b"GET /boom HTTP/1.1\r\n\r\n").unwrap();
        let result = tokio::spawn(Next::new(chain).run(Context::new(request))).await;

        assert!(result.is_err());
        assert!(cache.locks().is_empty());
    }

    #[test]
    fn invalid_lifetime_is_rejected_at_setup() {
        assert!(CacheMiddleware::new(MemoryStore::default(), "whenever").is_err());
        assert!(CacheMiddleware::new(MemoryStore::default(), 0u64).is_err());
        let ok = CacheMiddleware::new(MemoryStore::default(), "2s").unwrap();
        assert_eq!(ok.lifetime(), Duration::from_secs(2));
    }
}
