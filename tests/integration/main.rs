//! Integration tests for shellcache

mod support {
    use async_trait::async_trait;
    use shellcache::{
        AssetManifest, CacheRequest, CacheStore, CacheVersion, CachedEntry, HttpResponse,
        MemoryStore, NetworkFetcher, ShellcacheError, ShellcacheResult,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    pub fn manifest_v1() -> AssetManifest {
        AssetManifest::new(
            CacheVersion::new("v1").unwrap(),
            vec!["/a.html".to_string(), "/b.js".to_string()],
        )
    }

    /// The two shell assets every test manifest points at
    pub fn shell_fetcher() -> ScriptedFetcher {
        ScriptedFetcher::new()
            .with("/a.html", HttpResponse::ok(b"<html>shell</html>".to_vec()))
            .with("/b.js", HttpResponse::ok(b"console.log('shell');".to_vec()))
    }

    /// Fetcher scripted with per-URL responses. Unknown URLs error, and the
    /// whole fetcher can be switched offline. Records every request it sees.
    pub struct ScriptedFetcher {
        responses: HashMap<String, HttpResponse>,
        offline: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self {
                responses: HashMap::new(),
                offline: AtomicBool::new(false),
                calls: Mutex::new(vec![]),
            }
        }

        pub fn with(mut self, url: &str, response: HttpResponse) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NetworkFetcher for ScriptedFetcher {
        async fn fetch(&self, request: &CacheRequest) -> ShellcacheResult<HttpResponse> {
            self.calls.lock().unwrap().push(request.cache_key());

            if self.offline.load(Ordering::SeqCst) {
                return Err(ShellcacheError::network(request.url.clone(), "offline"));
            }
            self.responses
                .get(&request.url)
                .cloned()
                .ok_or_else(|| ShellcacheError::network(request.url.clone(), "unreachable"))
        }
    }

    /// Memory store with injectable faults: lookups and deletes can be made
    /// to fail wholesale, puts after a budget of successful ones.
    pub struct FlakyStore {
        inner: MemoryStore,
        fail_lookups: AtomicBool,
        fail_deletes: AtomicBool,
        puts_before_failure: Mutex<Option<usize>>,
    }

    impl FlakyStore {
        pub fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_lookups: AtomicBool::new(false),
                fail_deletes: AtomicBool::new(false),
                puts_before_failure: Mutex::new(None),
            }
        }

        pub fn fail_lookups(&self, fail: bool) {
            self.fail_lookups.store(fail, Ordering::SeqCst);
        }

        pub fn fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, Ordering::SeqCst);
        }

        /// The next `n` puts succeed; every later one fails
        pub fn fail_puts_after(&self, n: usize) {
            *self.puts_before_failure.lock().unwrap() = Some(n);
        }

        fn fault(context: &str) -> ShellcacheError {
            ShellcacheError::io(
                context,
                std::io::Error::new(std::io::ErrorKind::Other, "injected fault"),
            )
        }
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        async fn open(&self, bucket: &str) -> ShellcacheResult<()> {
            self.inner.open(bucket).await
        }

        async fn put(
            &self,
            bucket: &str,
            request: &CacheRequest,
            response: HttpResponse,
        ) -> ShellcacheResult<()> {
            {
                let mut budget = self.puts_before_failure.lock().unwrap();
                match budget.as_mut() {
                    Some(0) => return Err(Self::fault("writing entry")),
                    Some(remaining) => *remaining -= 1,
                    None => {}
                }
            }
            self.inner.put(bucket, request, response).await
        }

        async fn lookup(
            &self,
            bucket: &str,
            request: &CacheRequest,
        ) -> ShellcacheResult<Option<CachedEntry>> {
            if self.fail_lookups.load(Ordering::SeqCst) {
                return Err(Self::fault("reading entry"));
            }
            self.inner.lookup(bucket, request).await
        }

        async fn lookup_any(&self, request: &CacheRequest) -> ShellcacheResult<Option<CachedEntry>> {
            if self.fail_lookups.load(Ordering::SeqCst) {
                return Err(Self::fault("reading entry"));
            }
            self.inner.lookup_any(request).await
        }

        async fn bucket_names(&self) -> ShellcacheResult<Vec<String>> {
            self.inner.bucket_names().await
        }

        async fn delete_bucket(&self, bucket: &str) -> ShellcacheResult<bool> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(Self::fault("deleting bucket"));
            }
            self.inner.delete_bucket(bucket).await
        }

        async fn entry_count(&self, bucket: &str) -> ShellcacheResult<usize> {
            self.inner.entry_count(bucket).await
        }
    }
}

mod lifecycle_tests {
    use crate::support::{init_tracing, manifest_v1, shell_fetcher};
    use shellcache::{
        AssetManifest, CacheLifecycleManager, CacheRequest, CacheStore, FetchSource,
        HttpResponse, ManagerConfig, MemoryStore, Method, ResponseKind,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn full_shell_lifecycle() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(shell_fetcher());

        // A previous deploy's bucket is still around
        store
            .put(
                "v0",
                &CacheRequest::get("/a.html"),
                HttpResponse::ok(b"<html>old</html>".to_vec()),
            )
            .await
            .unwrap();

        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            store.clone(),
            fetcher.clone(),
            ManagerConfig::default(),
        );

        let install = mgr.install().await.unwrap();
        assert!(install.succeeded());
        assert_eq!(install.stored, 2);
        assert_eq!(store.entry_count("v1").await.unwrap(), 2);

        let activate = mgr.activate().await.unwrap();
        assert_eq!(activate.deleted, vec!["v0"]);
        assert_eq!(store.bucket_names().await.unwrap(), vec!["v1"]);

        // Cache-first: no network call beyond the two install fetches
        let get = mgr.fetch(&CacheRequest::get("/a.html")).await.unwrap();
        assert_eq!(get.source, FetchSource::Cache);
        assert_eq!(get.response.body, b"<html>shell</html>");
        assert_eq!(fetcher.call_count(), 2);

        // Non-GET goes straight through, method intact, nothing stored
        let post = mgr
            .fetch(&CacheRequest::new(Method::Post, "/a.html"))
            .await
            .unwrap();
        assert_eq!(post.source, FetchSource::Network);
        assert!(!post.stored);
        assert!(fetcher.calls().contains(&"POST /a.html".to_string()));
        assert_eq!(store.entry_count("v1").await.unwrap(), 2);

        let stats = mgr.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.passthroughs, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn precached_assets_served_offline() {
        let fetcher = Arc::new(shell_fetcher());
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            Arc::new(MemoryStore::new()),
            fetcher.clone(),
            ManagerConfig::default(),
        );
        mgr.install().await.unwrap();
        mgr.activate().await.unwrap();

        fetcher.set_offline(true);

        let a = mgr.fetch(&CacheRequest::get("/a.html")).await.unwrap();
        assert_eq!(a.source, FetchSource::Cache);
        assert_eq!(a.response.body, b"<html>shell</html>");

        let b = mgr.fetch(&CacheRequest::get("/b.js")).await.unwrap();
        assert_eq!(b.source, FetchSource::Cache);
        assert_eq!(b.response.body, b"console.log('shell');");

        // Nothing cached for this one and the network is gone
        let miss = mgr.fetch(&CacheRequest::get("/uncached.png")).await;
        assert!(matches!(miss, Err(ref e) if e.is_network()));
    }

    #[tokio::test]
    async fn opportunistic_store_roundtrip() {
        let fetcher = Arc::new(
            shell_fetcher().with("/late.css", HttpResponse::ok(b"body { margin: 0 }".to_vec())),
        );
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            Arc::new(MemoryStore::new()),
            fetcher.clone(),
            ManagerConfig::default(),
        );
        mgr.install().await.unwrap();
        mgr.activate().await.unwrap();

        let first = mgr.fetch(&CacheRequest::get("/late.css")).await.unwrap();
        assert_eq!(first.source, FetchSource::Network);
        assert!(first.stored);

        fetcher.set_offline(true);

        let second = mgr.fetch(&CacheRequest::get("/late.css")).await.unwrap();
        assert_eq!(second.source, FetchSource::Cache);
        assert_eq!(second.response, first.response);
    }

    #[tokio::test]
    async fn uncacheable_responses_never_stored() {
        let fetcher = Arc::new(
            shell_fetcher()
                .with("/missing", HttpResponse::new(404))
                .with(
                    "/tracker.js",
                    HttpResponse::ok(b"x".to_vec()).with_kind(ResponseKind::Cors),
                ),
        );
        let store = Arc::new(MemoryStore::new());
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            store.clone(),
            fetcher,
            ManagerConfig::default(),
        );
        mgr.install().await.unwrap();
        mgr.activate().await.unwrap();

        for url in ["/missing", "/tracker.js"] {
            for _ in 0..2 {
                let outcome = mgr.fetch(&CacheRequest::get(url)).await.unwrap();
                assert_eq!(outcome.source, FetchSource::Network, "{}", url);
                assert!(!outcome.stored, "{}", url);
            }
        }
        assert_eq!(store.entry_count("v1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn manifest_file_drives_manager() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("precache.toml");
        std::fs::write(
            &path,
            "version = \"v1\"\nassets = [\"/a.html\", \"/b.js\"]\n",
        )
        .unwrap();

        let manifest = AssetManifest::load(&path).await.unwrap();
        assert_eq!(manifest.version.as_str(), "v1");

        let mgr = CacheLifecycleManager::new(
            manifest,
            Arc::new(MemoryStore::new()),
            Arc::new(shell_fetcher()),
            ManagerConfig::default(),
        );
        let report = mgr.install().await.unwrap();
        assert_eq!(report.requested, 2);
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn second_generation_takes_over() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(shell_fetcher());

        let gen1 = CacheLifecycleManager::new(
            manifest_v1(),
            store.clone(),
            fetcher.clone(),
            ManagerConfig::default(),
        );
        gen1.install().await.unwrap();
        gen1.activate().await.unwrap();

        // New deploy: same assets, new version
        let gen2 = CacheLifecycleManager::new(
            AssetManifest::new(
                shellcache::CacheVersion::new("v2").unwrap(),
                vec!["/a.html".to_string(), "/b.js".to_string()],
            ),
            store.clone(),
            fetcher,
            ManagerConfig::default(),
        );
        gen2.install().await.unwrap();
        assert_eq!(
            store.bucket_names().await.unwrap(),
            vec!["v1", "v2"],
            "both generations coexist until activation"
        );

        let report = gen2.activate().await.unwrap();
        assert_eq!(report.deleted, vec!["v1"]);
        assert_eq!(store.bucket_names().await.unwrap(), vec!["v2"]);

        let outcome = gen2.fetch(&CacheRequest::get("/a.html")).await.unwrap();
        assert_eq!(outcome.source, FetchSource::Cache);
    }
}

mod degradation_tests {
    use crate::support::{init_tracing, manifest_v1, shell_fetcher, FlakyStore};
    use shellcache::{
        CacheLifecycleManager, CacheRequest, CacheStore, FetchSource, HttpResponse,
        ManagerConfig, WorkerState,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn lookup_failure_falls_through_to_network() {
        init_tracing();
        let store = Arc::new(FlakyStore::new());
        let fetcher = Arc::new(shell_fetcher());
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            store.clone(),
            fetcher,
            ManagerConfig::default(),
        );
        mgr.install().await.unwrap();
        mgr.activate().await.unwrap();

        store.fail_lookups(true);

        // The entry is cached, but the lookup faults; serving falls through
        let outcome = mgr.fetch(&CacheRequest::get("/a.html")).await.unwrap();
        assert_eq!(outcome.source, FetchSource::Network);
        assert_eq!(outcome.response.body, b"<html>shell</html>");
        assert_eq!(mgr.stats().lookup_faults, 1);
    }

    #[tokio::test]
    async fn write_failure_still_serves() {
        let store = Arc::new(FlakyStore::new());
        let fetcher =
            Arc::new(shell_fetcher().with("/new.css", HttpResponse::ok(b"c".to_vec())));
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            store.clone(),
            fetcher,
            ManagerConfig::default(),
        );
        mgr.install().await.unwrap();
        mgr.activate().await.unwrap();

        store.fail_puts_after(0);

        let outcome = mgr.fetch(&CacheRequest::get("/new.css")).await.unwrap();
        assert_eq!(outcome.source, FetchSource::Network);
        assert!(!outcome.stored);
        assert_eq!(outcome.response.body, b"c");

        // Nothing made it into the bucket
        let again = mgr.fetch(&CacheRequest::get("/new.css")).await.unwrap();
        assert_eq!(again.source, FetchSource::Network);
    }

    #[tokio::test]
    async fn install_store_failure_leaves_partial_bucket() {
        let store = Arc::new(FlakyStore::new());
        store.fail_puts_after(1);
        let fetcher = Arc::new(shell_fetcher());
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            store.clone(),
            fetcher,
            ManagerConfig::default(),
        );

        let report = mgr.install().await.unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.fetched, 2);
        assert_eq!(report.stored, 1);
        assert_eq!(store.entry_count("v1").await.unwrap(), 1);
        assert_eq!(mgr.state().await, WorkerState::Installed);

        // The incomplete bucket still serves what it has
        mgr.activate().await.unwrap();
        let cached = mgr.fetch(&CacheRequest::get("/a.html")).await.unwrap();
        assert_eq!(cached.source, FetchSource::Cache);
        let missed = mgr.fetch(&CacheRequest::get("/b.js")).await.unwrap();
        assert_eq!(missed.source, FetchSource::Network);
        assert!(!missed.stored);
    }

    #[tokio::test]
    async fn offline_install_degrades_to_network_only() {
        let store = Arc::new(FlakyStore::new());
        let fetcher = Arc::new(shell_fetcher());
        fetcher.set_offline(true);
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            store.clone(),
            fetcher.clone(),
            ManagerConfig::default(),
        );

        let report = mgr.install().await.unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.stored, 0);
        // Both assets were attempted before giving up
        assert_eq!(fetcher.call_count(), 2);

        // The worker still activates and serves once the network is back
        mgr.activate().await.unwrap();
        fetcher.set_offline(false);
        let outcome = mgr.fetch(&CacheRequest::get("/a.html")).await.unwrap();
        assert_eq!(outcome.source, FetchSource::Network);
        assert!(outcome.stored);
    }

    #[tokio::test]
    async fn prune_failure_recorded_not_fatal() {
        let store = Arc::new(FlakyStore::new());
        store.open("v0").await.unwrap();
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            store.clone(),
            Arc::new(shell_fetcher()),
            ManagerConfig::default(),
        );
        mgr.install().await.unwrap();

        store.fail_deletes(true);
        let report = mgr.activate().await.unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.failures.len(), 1);
        assert!(report.deleted.is_empty());
        assert_eq!(mgr.state().await, WorkerState::Activated);

        // Re-activation after the fault clears finishes the job
        store.fail_deletes(false);
        let retry = mgr.activate().await.unwrap();
        assert_eq!(retry.deleted, vec!["v0"]);
        assert!(retry.succeeded());
    }
}

mod fs_store_tests {
    use crate::support::{init_tracing, manifest_v1, shell_fetcher};
    use shellcache::{
        AssetManifest, CacheLifecycleManager, CacheRequest, CacheVersion, FetchSource, FsStore,
        ManagerConfig,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn cached_shell_survives_restart() {
        init_tracing();
        let temp = TempDir::new().unwrap();

        // First run: online, precache lands on disk
        {
            let fetcher = Arc::new(shell_fetcher());
            let mgr = CacheLifecycleManager::new(
                manifest_v1(),
                Arc::new(FsStore::new(temp.path())),
                fetcher,
                ManagerConfig::default(),
            );
            mgr.install().await.unwrap();
            mgr.activate().await.unwrap();
        }

        // Restarted worker, same version, network down: install fails but
        // the bucket still holds the previous run's entries
        let fetcher = Arc::new(shell_fetcher());
        fetcher.set_offline(true);
        let mgr = CacheLifecycleManager::new(
            manifest_v1(),
            Arc::new(FsStore::new(temp.path())),
            fetcher.clone(),
            ManagerConfig::default(),
        );

        let report = mgr.install().await.unwrap();
        assert!(!report.succeeded());
        mgr.activate().await.unwrap();

        let outcome = mgr.fetch(&CacheRequest::get("/a.html")).await.unwrap();
        assert_eq!(outcome.source, FetchSource::Cache);
        assert_eq!(outcome.response.body, b"<html>shell</html>");
        // Only the two failed install fetches ever reached the network
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn new_version_prunes_old_directory() {
        let temp = TempDir::new().unwrap();

        let gen1 = CacheLifecycleManager::new(
            manifest_v1(),
            Arc::new(FsStore::new(temp.path())),
            Arc::new(shell_fetcher()),
            ManagerConfig::default(),
        );
        gen1.install().await.unwrap();
        gen1.activate().await.unwrap();
        assert!(temp.path().join("v1").exists());

        let gen2 = CacheLifecycleManager::new(
            AssetManifest::new(
                CacheVersion::new("v2").unwrap(),
                vec!["/a.html".to_string(), "/b.js".to_string()],
            ),
            Arc::new(FsStore::new(temp.path())),
            Arc::new(shell_fetcher()),
            ManagerConfig::default(),
        );
        gen2.install().await.unwrap();
        let report = gen2.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["v1"]);
        assert!(!temp.path().join("v1").exists());
        assert!(temp.path().join("v2").exists());
    }
}
