//! In-memory cache store
//!
//! Process-local backend used by tests and by hosts that do not need
//! persistence. Buckets are kept in name order so cross-bucket matching
//! is deterministic.

use crate::error::ShellcacheResult;
use crate::http::{CacheRequest, CachedEntry, HttpResponse};
use crate::store::CacheStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// In-memory store: bucket name to keyed entries
#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<BTreeMap<String, HashMap<String, CachedEntry>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, bucket: &str) -> ShellcacheResult<()> {
        let mut buckets = self.buckets.write().await;
        buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        request: &CacheRequest,
        response: HttpResponse,
    ) -> ShellcacheResult<()> {
        let entry = CachedEntry::new(request.clone(), response);
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(request.cache_key(), entry);
        Ok(())
    }

    async fn lookup(
        &self,
        bucket: &str,
        request: &CacheRequest,
    ) -> ShellcacheResult<Option<CachedEntry>> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(bucket)
            .and_then(|entries| entries.get(&request.cache_key()))
            .cloned())
    }

    async fn lookup_any(&self, request: &CacheRequest) -> ShellcacheResult<Option<CachedEntry>> {
        let key = request.cache_key();
        let buckets = self.buckets.read().await;
        for entries in buckets.values() {
            if let Some(entry) = entries.get(&key) {
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }

    async fn bucket_names(&self) -> ShellcacheResult<Vec<String>> {
        let buckets = self.buckets.read().await;
        Ok(buckets.keys().cloned().collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> ShellcacheResult<bool> {
        let mut buckets = self.buckets.write().await;
        Ok(buckets.remove(bucket).is_some())
    }

    async fn entry_count(&self, bucket: &str) -> ShellcacheResult<usize> {
        let buckets = self.buckets.read().await;
        Ok(buckets.get(bucket).map_or(0, HashMap::len))
    }
}
