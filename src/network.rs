//! Network fetch abstraction
//!
//! The lifecycle manager never talks to a transport directly; it goes
//! through [`NetworkFetcher`] so embedders can plug in whatever HTTP
//! client they already carry, and tests can script responses.

use crate::error::ShellcacheResult;
use crate::http::{CacheRequest, HttpResponse};
use async_trait::async_trait;

/// Abstraction over the network transport.
///
/// Implementations should map transport failures into
/// [`ShellcacheError::NetworkFetch`](crate::error::ShellcacheError::NetworkFetch)
/// so callers can tell network trouble apart from store trouble. A
/// non-success HTTP status is not an error: return the response and let
/// the caller decide whether it is cacheable.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    /// Perform the request against the origin and return its response
    async fn fetch(&self, request: &CacheRequest) -> ShellcacheResult<HttpResponse>;
}
