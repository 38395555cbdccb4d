//! Cache store collaborators
//!
//! The store is the external key-value side of the system: named buckets
//! holding request-to-response pairs. Buckets are created implicitly on
//! first open and destroyed explicitly during activation pruning. The
//! platform's bulk `putAll` is composed by the lifecycle manager from
//! per-entry `put` calls.
//!
//! Two backends ship in-tree:
//! - [`MemoryStore`] — process-local, for tests and embedded hosts
//! - [`FsStore`] — one directory per bucket, entries as hash-named files

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::error::ShellcacheResult;
use crate::http::{CacheRequest, CachedEntry, HttpResponse};
use async_trait::async_trait;

/// Abstract cache store interface
///
/// Implementations must be safe for concurrent use; the manager calls
/// them from overlapping fetch handlers without locking. Same-key writes
/// are last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a bucket, creating it if absent
    async fn open(&self, bucket: &str) -> ShellcacheResult<()>;

    /// Store an entry, replacing any entry with the same key.
    /// The bucket is created implicitly if it does not exist.
    async fn put(
        &self,
        bucket: &str,
        request: &CacheRequest,
        response: HttpResponse,
    ) -> ShellcacheResult<()>;

    /// Look a request up in a single bucket
    async fn lookup(
        &self,
        bucket: &str,
        request: &CacheRequest,
    ) -> ShellcacheResult<Option<CachedEntry>>;

    /// Look a request up across all buckets, first hit in bucket-name
    /// order wins
    async fn lookup_any(&self, request: &CacheRequest) -> ShellcacheResult<Option<CachedEntry>>;

    /// Names of all existing buckets, sorted
    async fn bucket_names(&self) -> ShellcacheResult<Vec<String>>;

    /// Delete a bucket and everything in it. Returns false if it did
    /// not exist.
    async fn delete_bucket(&self, bucket: &str) -> ShellcacheResult<bool>;

    /// Number of entries in a bucket (0 for a missing bucket)
    async fn entry_count(&self, bucket: &str) -> ShellcacheResult<usize>;
}
