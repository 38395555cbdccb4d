//! Worker lifecycle: install, activate, fetch
//!
//! One [`CacheLifecycleManager`] per worker generation. The host drives it
//! through three triggers and gets an observable result back from each:
//!
//! | Trigger    | Does                                             | Returns |
//! |------------|--------------------------------------------------|---------|
//! | install()  | precache the manifest into the version's bucket  | [`InstallReport`] |
//! | activate() | prune buckets not named by the current version   | [`ActivateReport`] |
//! | fetch()    | cache-first GET serving, non-GET pass-through    | [`FetchOutcome`] |
//!
//! Cache-path failures degrade service and surface in the returned report;
//! they never abort the lifecycle event that hit them.

pub mod manager;
pub mod state;

pub use manager::{CacheLifecycleManager, ManagerConfig, MatchScope};
pub use state::{
    ActivateReport, FetchOutcome, FetchSource, InstallReport, ServeStats, WorkerState,
};
