use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::{Response, StatusCode};

/// A stored response: body, content type, status and redirect target,
/// replayed verbatim on a hit.
///
/// Entries are written once per miss and never mutated; they disappear when
/// their lifetime runs out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub body: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// `Location` of a plain 3xx response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl CachedEntry {
    /// Captures the cacheable parts of a response produced by a handler.
    pub fn from_response(response: &Response) -> Self {
        Self {
            body: Bytes::copy_from_slice(response.payload()),
            content_type: response.content_type().map(str::to_owned),
            status_code: Some(response.status().as_u16()),
            location: response.headers().get("location").map(str::to_owned),
        }
    }

    /// Rebuilds the response to send for a cache hit.
    ///
    /// The content type, status and `Location` are applied only when present;
    /// a status this crate does not model leaves the default `200 OK`. No other
    /// response header is stored.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(StatusCode::Ok).body_bytes(self.body.to_vec());

        if let Some(content_type) = &self.content_type {
            response.set_header("Content-Type", content_type.as_str());
        }
        if let Some(location) = &self.location {
            response.set_header("Location", location.as_str());
        }

        match self.status_code.map(|code| (code, StatusCode::from_u16(code))) {
            Some((_, Some(status))) => response.set_status(status),
            Some((code, None)) => {
                tracing::debug!(status = code, "ignoring unknown cached status code");
            }
            None => {}
        }

        response
    }

    /// Serializes the entry into the record format shared by every store.
    pub fn encode(&self) -> Result<Bytes, StoreError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(StoreError::Encode)
    }

    /// Parses a record previously produced by [`encode`](Self::encode).
    pub fn decode(record: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(record).map_err(StoreError::Decode)
    }
}
