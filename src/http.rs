//! Request and response descriptors
//!
//! Minimal HTTP-shaped types for cache keying and storage. Transport is an
//! external collaborator; these types carry only what the cache policy
//! needs: method + URL on the request side, status/headers/body plus a
//! response kind on the response side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Method {
    /// Whether this is a GET request. Only GET requests are intercepted
    /// by the cache; everything else passes through to the network.
    pub fn is_get(&self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        };
        write!(f, "{}", name)
    }
}

/// A request descriptor: the cache key is method + URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRequest {
    /// Request method
    pub method: Method,

    /// Request URL (matched exactly; no normalization)
    pub url: String,
}

impl CacheRequest {
    /// Create a request descriptor
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    /// Create a GET request descriptor
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// The store key this request is filed under
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

impl fmt::Display for CacheRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Response kind, mirroring how inspectable the payload is
///
/// `Opaque` responses come from cross-origin requests whose contents the
/// requesting context cannot inspect; they are never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin, fully inspectable
    Basic,
    /// Cross-origin with CORS headers
    Cors,
    /// Cross-origin, non-inspectable
    Opaque,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Basic => "basic",
            Self::Cors => "cors",
            Self::Opaque => "opaque",
        };
        write!(f, "{}", name)
    }
}

/// A response descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,

    /// Response headers (name to value)
    pub headers: BTreeMap<String, String>,

    /// Response body bytes
    pub body: Vec<u8>,

    /// Response kind
    pub kind: ResponseKind,
}

impl HttpResponse {
    /// Create a response with the given status, no headers, empty body
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
            kind: ResponseKind::Basic,
        }
    }

    /// Create a 200 Basic response with the given body
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    /// Set a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the response kind
    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Whether this response may be stored: status 200 and Basic kind.
    /// Partial, erroring, and non-inspectable responses are never cached.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}

/// A single cached request-to-response pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    /// The request this entry is keyed on
    pub request: CacheRequest,

    /// The stored response
    pub response: HttpResponse,

    /// When this entry was stored
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    /// Create an entry stamped with the current time
    pub fn new(request: CacheRequest, response: HttpResponse) -> Self {
        Self {
            request,
            response,
            stored_at: Utc::now(),
        }
    }
}
