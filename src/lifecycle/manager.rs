//! Cache lifecycle management
//!
//! `CacheLifecycleManager` mediates the three lifecycle triggers — install,
//! activate, fetch — between a cache store and a network fetcher. Handler
//! failures on the cache path are captured into the returned reports and
//! logged; they never abort the lifecycle event itself. The only `Err`s a
//! handler produces are lifecycle-ordering violations and network failures
//! on a path with no cache fallback.

use crate::error::{ShellcacheError, ShellcacheResult};
use crate::http::{CacheRequest, CachedEntry, HttpResponse};
use crate::lifecycle::state::{
    ActivateReport, FetchOutcome, FetchSource, InstallReport, ServeStats, WorkerState,
};
use crate::manifest::{AssetManifest, CacheVersion};
use crate::network::NetworkFetcher;
use crate::store::CacheStore;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which buckets a fetch lookup consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchScope {
    /// Only the bucket named by the current version. The default: never
    /// serve from a bucket activation is about to prune.
    #[default]
    CurrentVersion,
    /// First hit across all buckets in name order, for hosts that relied
    /// on unscoped matching.
    AnyBucket,
}

/// Tuning knobs for the lifecycle manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Delete stale buckets during activation
    pub prune_on_activate: bool,

    /// Lookup scope for the fetch handler
    pub match_scope: MatchScope,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            prune_on_activate: true,
            match_scope: MatchScope::default(),
        }
    }
}

impl ManagerConfig {
    /// Set whether activation prunes stale buckets
    pub fn with_prune_on_activate(mut self, prune: bool) -> Self {
        self.prune_on_activate = prune;
        self
    }

    /// Set the fetch lookup scope
    pub fn with_match_scope(mut self, scope: MatchScope) -> Self {
        self.match_scope = scope;
        self
    }
}

/// Serving counters, snapshotted by [`CacheLifecycleManager::stats`]
#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    passthroughs: AtomicU64,
    stored: AtomicU64,
    lookup_faults: AtomicU64,
}

/// The lifecycle policy engine: precache on install, prune on activate,
/// cache-first serving on fetch.
pub struct CacheLifecycleManager {
    /// Instance id, logged so overlapping worker generations are
    /// distinguishable
    id: Uuid,
    manifest: AssetManifest,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn NetworkFetcher>,
    config: ManagerConfig,
    state: RwLock<WorkerState>,
    counters: Counters,
}

impl CacheLifecycleManager {
    /// Create a manager for one worker generation. The manifest's version
    /// names the bucket this generation owns.
    pub fn new(
        manifest: AssetManifest,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn NetworkFetcher>,
        config: ManagerConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!(
            "[{}] Created lifecycle manager for version {}",
            id, manifest.version
        );
        Self {
            id,
            manifest,
            store,
            fetcher,
            config,
            state: RwLock::new(WorkerState::Installing),
            counters: Counters::default(),
        }
    }

    /// This generation's cache version
    pub fn version(&self) -> &CacheVersion {
        &self.manifest.version
    }

    /// Instance id of this manager
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Snapshot the serving counters
    pub fn stats(&self) -> ServeStats {
        ServeStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            passthroughs: self.counters.passthroughs.load(Ordering::Relaxed),
            stored: self.counters.stored.load(Ordering::Relaxed),
            lookup_faults: self.counters.lookup_faults.load(Ordering::Relaxed),
        }
    }

    fn bucket(&self) -> &str {
        self.manifest.version.as_str()
    }

    /// Install handler: pre-populate this version's bucket with every
    /// manifest asset.
    ///
    /// Precache failures are captured in the report and logged, never
    /// returned as `Err` — the worker transitions to `Installed` either
    /// way. `Err` only signals an ordering violation (install called
    /// twice, or after activation).
    pub async fn install(&self) -> ShellcacheResult<InstallReport> {
        {
            let state = self.state.read().await;
            if !state.can_install() {
                return Err(ShellcacheError::LifecycleState {
                    event: "install",
                    state: state.to_string(),
                });
            }
        }

        info!(
            "[{}] Installing version {} ({} assets)",
            self.id,
            self.bucket(),
            self.manifest.len()
        );

        let report = self.precache().await;
        match &report.failure {
            None => info!(
                "[{}] Precached {} assets into bucket {}",
                self.id, report.stored, report.bucket
            ),
            Some(reason) => warn!("[{}] {}", self.id, reason),
        }

        *self.state.write().await = WorkerState::Installed;
        Ok(report)
    }

    /// The bulk precache: fetch every manifest asset concurrently, then
    /// store the batch. A fetch failure or uncacheable response abandons
    /// the batch before anything is stored; a store failure leaves the
    /// bucket partially populated. Both end up in the report.
    async fn precache(&self) -> InstallReport {
        let bucket = self.bucket();
        let mut report = InstallReport {
            bucket: bucket.to_string(),
            requested: self.manifest.len(),
            fetched: 0,
            stored: 0,
            failure: None,
        };

        if let Err(e) = self.store.open(bucket).await {
            report.failure = Some(
                ShellcacheError::BucketOpen {
                    bucket: bucket.to_string(),
                    reason: e.to_string(),
                }
                .to_string(),
            );
            return report;
        }
        debug!("[{}] Opened bucket {}", self.id, bucket);

        let requests: Vec<CacheRequest> = self
            .manifest
            .assets
            .iter()
            .map(|path| CacheRequest::get(path.as_str()))
            .collect();

        // Fetch phase: every asset in flight at once
        let results = join_all(requests.iter().map(|req| self.fetcher.fetch(req))).await;

        let mut batch = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(response) if response.is_cacheable() => {
                    report.fetched += 1;
                    batch.push((request, response));
                }
                Ok(response) => {
                    report.failure = Some(
                        ShellcacheError::Precache {
                            bucket: bucket.to_string(),
                            reason: format!(
                                "asset {} is not cacheable (status {}, kind {})",
                                request.url, response.status, response.kind
                            ),
                        }
                        .to_string(),
                    );
                    return report;
                }
                Err(e) => {
                    report.failure = Some(
                        ShellcacheError::Precache {
                            bucket: bucket.to_string(),
                            reason: format!("asset {}: {}", request.url, e),
                        }
                        .to_string(),
                    );
                    return report;
                }
            }
        }

        // Store phase
        for (request, response) in batch {
            if let Err(e) = self.store.put(bucket, request, response).await {
                report.failure = Some(
                    ShellcacheError::CacheWrite {
                        bucket: bucket.to_string(),
                        url: request.url.clone(),
                        reason: e.to_string(),
                    }
                    .to_string(),
                );
                return report;
            }
            report.stored += 1;
        }

        report
    }

    /// Activate handler: delete every bucket whose name is not the current
    /// version (when pruning is enabled).
    ///
    /// Per-bucket deletion failures are recorded in the report and logged;
    /// remaining buckets are still attempted. Idempotent — a second run
    /// finds nothing to delete. `Err` only signals an ordering violation
    /// (activation before install completed).
    pub async fn activate(&self) -> ShellcacheResult<ActivateReport> {
        {
            let state = self.state.read().await;
            if !state.can_activate() {
                return Err(ShellcacheError::LifecycleState {
                    event: "activate",
                    state: state.to_string(),
                });
            }
        }
        *self.state.write().await = WorkerState::Activating;

        let retained = self.bucket().to_string();
        let mut report = ActivateReport {
            retained: retained.clone(),
            deleted: vec![],
            failures: vec![],
            pruned: self.config.prune_on_activate,
        };

        if self.config.prune_on_activate {
            self.prune(&retained, &mut report).await;
        } else {
            debug!(
                "[{}] Pruning disabled, stale buckets retained",
                self.id
            );
        }

        *self.state.write().await = WorkerState::Activated;
        info!(
            "[{}] Activated version {} ({} stale buckets deleted)",
            self.id,
            retained,
            report.deleted.len()
        );
        Ok(report)
    }

    async fn prune(&self, retained: &str, report: &mut ActivateReport) {
        let names = match self.store.bucket_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!("[{}] Failed to list buckets for pruning: {}", self.id, e);
                report.failures.push(format!("listing buckets: {}", e));
                return;
            }
        };

        for name in names.into_iter().filter(|n| n != retained) {
            match self.store.delete_bucket(&name).await {
                Ok(true) => {
                    info!("[{}] Pruned stale bucket {}", self.id, name);
                    report.deleted.push(name);
                }
                // Already gone: another generation won the race
                Ok(false) => {}
                Err(e) => {
                    let err = ShellcacheError::BucketDelete {
                        bucket: name,
                        reason: e.to_string(),
                    };
                    warn!("[{}] {}", self.id, err);
                    report.failures.push(err.to_string());
                }
            }
        }
    }

    /// Fetch handler: cache-first for GET, pass-through for every other
    /// method.
    ///
    /// A lookup failure falls through to the network; a cache-write failure
    /// still serves the network response (`stored: false`). `Err` means
    /// either an ordering violation or a network failure with no cached
    /// copy to fall back on.
    pub async fn fetch(&self, request: &CacheRequest) -> ShellcacheResult<FetchOutcome> {
        {
            let state = self.state.read().await;
            if !state.can_serve() {
                return Err(ShellcacheError::LifecycleState {
                    event: "fetch",
                    state: state.to_string(),
                });
            }
        }

        if !request.method.is_get() {
            return self.pass_through(request).await;
        }

        match self.lookup(request).await {
            Ok(Some(entry)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("[{}] Cache hit: {}", self.id, request.url);
                return Ok(FetchOutcome {
                    response: entry.response,
                    source: FetchSource::Cache,
                    stored: false,
                });
            }
            Ok(None) => {}
            Err(e) => {
                // Lookup trouble never blocks serving; go to the network
                self.counters.lookup_faults.fetch_add(1, Ordering::Relaxed);
                let err = ShellcacheError::Lookup {
                    bucket: self.bucket().to_string(),
                    reason: e.to_string(),
                };
                warn!("[{}] {}", self.id, err);
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] Cache miss: {}", self.id, request.url);

        let response = match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "[{}] Network fetch failed for {}: {}",
                    self.id, request.url, e
                );
                return Err(e);
            }
        };

        let stored = if response.is_cacheable() {
            self.store_copy(request, &response).await
        } else {
            false
        };

        Ok(FetchOutcome {
            response,
            source: FetchSource::Network,
            stored,
        })
    }

    /// Forward a non-GET request untouched, with no cache interaction
    async fn pass_through(&self, request: &CacheRequest) -> ShellcacheResult<FetchOutcome> {
        self.counters.passthroughs.fetch_add(1, Ordering::Relaxed);
        debug!("[{}] Pass-through: {}", self.id, request);

        let response = match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "[{}] Pass-through fetch failed for {}: {}",
                    self.id, request.url, e
                );
                return Err(e);
            }
        };

        Ok(FetchOutcome {
            response,
            source: FetchSource::Network,
            stored: false,
        })
    }

    /// Opportunistically store a copy of a network response. A write
    /// failure degrades to network-only serving, never fails the fetch.
    async fn store_copy(&self, request: &CacheRequest, response: &HttpResponse) -> bool {
        match self
            .store
            .put(self.bucket(), request, response.clone())
            .await
        {
            Ok(()) => {
                self.counters.stored.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "[{}] Stored {} into bucket {}",
                    self.id,
                    request.url,
                    self.bucket()
                );
                true
            }
            Err(e) => {
                let err = ShellcacheError::CacheWrite {
                    bucket: self.bucket().to_string(),
                    url: request.url.clone(),
                    reason: e.to_string(),
                };
                warn!("[{}] {}", self.id, err);
                false
            }
        }
    }

    async fn lookup(&self, request: &CacheRequest) -> ShellcacheResult<Option<CachedEntry>> {
        match self.config.match_scope {
            MatchScope::CurrentVersion => self.store.lookup(self.bucket(), request).await,
            MatchScope::AnyBucket => self.store.lookup_any(request).await,
        }
    }
}
