//! Cache key derivation.
//!
//! A key is `cached-route-<METHOD>-<path>` optionally followed by the sorted
//! query string and the values of any headers the [`KeyPolicy`] names.
//! Authentication context only participates when the policy lists the
//! relevant header (`authorization`, `cookie`).
//!
//! Path segments, query names and values, and header values are
//! percent-encoded, so `?`, `&`, `=`, `|` and `,` only ever appear as
//! separators and distinct requests cannot collide on one key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Request;

const KEY_PREFIX: &str = "cached-route-";

/// Opaque identifier of a cacheable request. Equal requests derive equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps an already-derived key, for stores with their own key scheme.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the key for `request` under `policy`.
    ///
    /// # Examples
    ///
    /// ```
    /// use routecache::{Request, cache::{CacheKey, KeyPolicy}};
    ///
    /// let (a, _) = Request::parse(b"GET /videos//?b=2&a=1 HTTP/1.1\r\n\r\n").unwrap();
    /// let (b, _) = Request::parse(b"GET /videos?a=1&b=2 HTTP/1.1\r\n\r\n").unwrap();
    ///
    /// let policy = KeyPolicy::default();
    /// assert_eq!(CacheKey::derive(&a, &policy), CacheKey::derive(&b, &policy));
    /// assert_eq!(CacheKey::derive(&b, &policy).as_str(), "cached-route-GET-/videos?a=1&b=2");
    /// ```
    pub fn derive(request: &Request, policy: &KeyPolicy) -> Self {
        let mut key = format!(
            "{KEY_PREFIX}{}-{}",
            request.method(),
            normalize_path(request.path())
        );

        if policy.include_query {
            if let Some(query) = request.query_string() {
                let mut pairs: Vec<String> = query
                    .split('&')
                    .filter(|p| !p.is_empty())
                    .map(encode_pair)
                    .collect();
                if !pairs.is_empty() {
                    pairs.sort_unstable();
                    key.push('?');
                    key.push_str(&pairs.join("&"));
                }
            }
        }

        for name in &policy.vary_headers {
            let values: Vec<_> = request
                .headers()
                .get_all(name)
                .map(urlencoding::encode)
                .collect();
            key.push('|');
            key.push_str(&name.to_ascii_lowercase());
            key.push('=');
            key.push_str(&values.join(","));
        }

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which parts of a request, beyond method and path, identify a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyPolicy {
    /// Include the (sorted) query string. Default: `true`.
    pub include_query: bool,
    /// Request headers whose values participate in the key.
    pub vary_headers: Vec<String>,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            include_query: true,
            vary_headers: Vec::new(),
        }
    }
}

impl KeyPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn include_query(mut self, include: bool) -> Self {
        self.include_query = include;
        self
    }

    /// Adds a request header to the key, e.g. `Accept-Language`.
    #[must_use]
    pub fn vary_header(mut self, name: impl Into<String>) -> Self {
        self.vary_headers.push(name.into());
        self
    }
}

// Collapses repeated slashes and drops a trailing slash, keeping the root as `/`.
fn normalize_path(path: &str) -> String {
    let segments: Vec<_> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(urlencoding::encode)
        .collect();
    if segments.is_empty() {
        return "/".to_owned();
    }
    format!("/{}", segments.join("/"))
}

fn encode_pair(pair: &str) -> String {
    match pair.split_once('=') {
        Some((name, value)) => format!(
            "{}={}",
            urlencoding::encode(name),
            urlencoding::encode(value)
        ),
        None => urlencoding::encode(pair).into_owned(),
    }
}
