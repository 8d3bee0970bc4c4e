//! HTTP response builder.
//!
//! Handlers build a [`Response`] with the fluent API and hand it back up the
//! middleware chain. The value is the "terminal write" of a request: a plain
//! response corresponds to a send, one built with [`Response::redirect`] to a
//! redirect. The cache layer relies on that distinction.

use super::{Headers, StatusCode};

/// The response a handler hands back up the middleware chain.
///
/// # Examples
///
/// ```
/// use routecache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.content_type(), Some("application/json"));
/// assert_eq!(response.payload(), br#"{"status":"ok"}"#);
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    redirect: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            redirect: false,
        }
    }

    /// Creates a `302 Found` redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::redirect_with(StatusCode::Found, location)
    }

    /// Creates a redirect to `location` with an explicit status.
    ///
    /// Whatever the status, the response is flagged as a redirect and is never
    /// stored by the response cache.
    pub fn redirect_with(status: StatusCode, location: impl Into<String>) -> Self {
        let mut response = Self::new(status).header("Location", location);
        response.redirect = true;
        response
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header in-place, replacing any earlier values under that name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The `Content-Type` header explicitly set on this response, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    /// The body bytes as currently set.
    pub fn payload(&self) -> &[u8] {
        &self.body
    }

    /// `true` when the response was built with [`Response::redirect`] or
    /// [`Response::redirect_with`].
    pub fn is_redirect(&self) -> bool {
        self.redirect
    }
}
