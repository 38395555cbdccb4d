//! Shellcache - versioned offline asset cache
//!
//! Lifecycle-managed caching for application shells: precache a fixed
//! asset manifest on install, serve cache-first on fetch, and garbage
//! collect superseded cache buckets on activate.

pub mod error;
pub mod http;
pub mod lifecycle;
pub mod manifest;
pub mod network;
pub mod store;

pub use error::{ShellcacheError, ShellcacheResult};
pub use http::{CacheRequest, CachedEntry, HttpResponse, Method, ResponseKind};
pub use lifecycle::{
    ActivateReport, CacheLifecycleManager, FetchOutcome, FetchSource, InstallReport,
    ManagerConfig, MatchScope, ServeStats, WorkerState,
};
pub use manifest::{AssetManifest, CacheVersion};
pub use network::NetworkFetcher;
pub use store::{CacheStore, FsStore, MemoryStore};
