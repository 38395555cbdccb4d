//! Filesystem cache store
//!
//! One directory per bucket under a root directory. Each entry is a pair
//! of files named by a hash of the request key:
//!
//!   - `{hash}.body` — raw response body bytes
//!   - `{hash}.json` — envelope: request, status, headers, kind, stored_at
//!
//! The envelope is written after the body, so a readable envelope marks a
//! complete entry. Directory names under the root that are not valid
//! bucket names are ignored.

use crate::error::{ShellcacheError, ShellcacheResult};
use crate::http::{CacheRequest, CachedEntry, HttpResponse, ResponseKind};
use crate::manifest::CacheVersion;
use crate::store::CacheStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// On-disk entry metadata, stored beside the raw body
#[derive(Serialize, Deserialize)]
struct EntryEnvelope {
    request: CacheRequest,
    status: u16,
    headers: BTreeMap<String, String>,
    kind: ResponseKind,
    stored_at: DateTime<Utc>,
}

/// Filesystem-backed cache store
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at the given directory.
    /// Nothing is created until the first bucket is opened or written.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default root under the platform cache directory
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shellcache")
    }

    /// The root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hash a request key into an entry file stem (first 16 hex chars)
    fn entry_stem(request: &CacheRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.cache_key().as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Resolve a bucket directory, rejecting names that are not safe as
    /// path components
    fn bucket_path(&self, bucket: &str) -> ShellcacheResult<PathBuf> {
        CacheVersion::new(bucket)?;
        Ok(self.root.join(bucket))
    }

    async fn read_entry(&self, dir: &Path, stem: &str) -> ShellcacheResult<Option<CachedEntry>> {
        let envelope_path = dir.join(format!("{}.json", stem));
        if !envelope_path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&envelope_path).await.map_err(|e| {
            ShellcacheError::io(
                format!("reading cache envelope {}", envelope_path.display()),
                e,
            )
        })?;
        let envelope: EntryEnvelope = serde_json::from_str(&raw)?;

        let body_path = dir.join(format!("{}.body", stem));
        let body = fs::read(&body_path).await.map_err(|e| {
            ShellcacheError::io(format!("reading cache body {}", body_path.display()), e)
        })?;

        Ok(Some(CachedEntry {
            request: envelope.request,
            response: HttpResponse {
                status: envelope.status,
                headers: envelope.headers,
                body,
                kind: envelope.kind,
            },
            stored_at: envelope.stored_at,
        }))
    }
}

#[async_trait]
impl CacheStore for FsStore {
    async fn open(&self, bucket: &str) -> ShellcacheResult<()> {
        let dir = self.bucket_path(bucket)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ShellcacheError::io(format!("creating bucket {}", dir.display()), e))
    }

    async fn put(
        &self,
        bucket: &str,
        request: &CacheRequest,
        response: HttpResponse,
    ) -> ShellcacheResult<()> {
        let dir = self.bucket_path(bucket)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ShellcacheError::io(format!("creating bucket {}", dir.display()), e))?;

        let stem = Self::entry_stem(request);

        let body_path = dir.join(format!("{}.body", stem));
        fs::write(&body_path, &response.body).await.map_err(|e| {
            ShellcacheError::io(format!("writing cache body {}", body_path.display()), e)
        })?;

        let envelope = EntryEnvelope {
            request: request.clone(),
            status: response.status,
            headers: response.headers,
            kind: response.kind,
            stored_at: Utc::now(),
        };
        let envelope_path = dir.join(format!("{}.json", stem));
        let raw = serde_json::to_string_pretty(&envelope)?;
        fs::write(&envelope_path, raw).await.map_err(|e| {
            ShellcacheError::io(
                format!("writing cache envelope {}", envelope_path.display()),
                e,
            )
        })?;

        Ok(())
    }

    async fn lookup(
        &self,
        bucket: &str,
        request: &CacheRequest,
    ) -> ShellcacheResult<Option<CachedEntry>> {
        let dir = self.bucket_path(bucket)?;
        if !dir.exists() {
            return Ok(None);
        }
        self.read_entry(&dir, &Self::entry_stem(request)).await
    }

    async fn lookup_any(&self, request: &CacheRequest) -> ShellcacheResult<Option<CachedEntry>> {
        for bucket in self.bucket_names().await? {
            if let Some(entry) = self.lookup(&bucket, request).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    async fn bucket_names(&self) -> ShellcacheResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut names = vec![];
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| ShellcacheError::io("reading store root", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShellcacheError::io("reading store root entry", e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| ShellcacheError::io("inspecting store root entry", e))?
                .is_dir();
            if !is_dir {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if CacheVersion::new(name.clone()).is_ok() {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete_bucket(&self, bucket: &str) -> ShellcacheResult<bool> {
        let dir = self.bucket_path(bucket)?;
        if !dir.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| ShellcacheError::io(format!("deleting bucket {}", dir.display()), e))?;
        Ok(true)
    }

    async fn entry_count(&self, bucket: &str) -> ShellcacheResult<usize> {
        let dir = self.bucket_path(bucket)?;
        if !dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| ShellcacheError::io(format!("reading bucket {}", dir.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShellcacheError::io("reading bucket entry", e))?
        {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }

        Ok(count)
    }
}
