//! # routecache
//!
//! A request-coalescing HTTP response cache, packaged with the small HTTP
//! types and middleware pipeline it plugs into.
//!
//! Concurrent requests for the same resource wait for a single handler run
//! and are answered from its result; later requests are replayed from the
//! store until the entry's lifetime runs out.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use routecache::{Request, Response, StatusCode};
//! use routecache::cache::{CacheMiddleware, MemoryStore};
//! use routecache::context::Context;
//! use routecache::middleware::{Next, from_fn, from_middleware};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = Arc::new(CacheMiddleware::new(MemoryStore::default(), "10 minutes").unwrap());
//! let handler = from_fn(|_ctx| async {
//!     Response::new(StatusCode::Ok)
//!         .header("Content-Type", "application/json")
//!         .body(r#"{"videos":[]}"#)
//! });
//!
//! let (request, _) = Request::parse(b"GET /api/v1/videos HTTP/1.1\r\n\r\n").unwrap();
//! let response = Next::new(vec![from_middleware(cache), handler])
//!     .run(Context::new(request))
//!     .await;
//! assert_eq!(response.status(), StatusCode::Ok);
//! # }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheKey, CacheMiddleware, CacheStore, MemoryStore};
pub use http::{Headers, Method, Request, Response, StatusCode};
