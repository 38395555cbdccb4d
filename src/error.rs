//! Error types for shellcache
//!
//! All modules use `ShellcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for shellcache operations
pub type ShellcacheResult<T> = Result<T, ShellcacheError>;

/// All errors that can occur in shellcache
#[derive(Error, Debug)]
pub enum ShellcacheError {
    // Version and manifest errors
    #[error("Invalid cache version {0:?}: must be non-empty and limited to [A-Za-z0-9._-]")]
    InvalidVersion(String),

    #[error("Manifest file not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid manifest at {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    // Lifecycle errors
    #[error("Cannot {event} while worker is {state}")]
    LifecycleState { event: &'static str, state: String },

    // Install errors
    #[error("Failed to open cache bucket {bucket}: {reason}")]
    BucketOpen { bucket: String, reason: String },

    #[error("Precache into bucket {bucket} failed: {reason}")]
    Precache { bucket: String, reason: String },

    // Fetch errors
    #[error("Cache lookup in bucket {bucket} failed: {reason}")]
    Lookup { bucket: String, reason: String },

    #[error("Network fetch failed for {url}: {reason}")]
    NetworkFetch { url: String, reason: String },

    #[error("Failed to cache {url} in bucket {bucket}: {reason}")]
    CacheWrite {
        bucket: String,
        url: String,
        reason: String,
    },

    // Activate errors
    #[error("Failed to delete cache bucket {bucket}: {reason}")]
    BucketDelete { bucket: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl ShellcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network fetch error
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure came from the network collaborator rather than
    /// the cache path. Hosts use this to distinguish "we are offline" from
    /// a store or lifecycle problem.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkFetch { .. })
    }
}
