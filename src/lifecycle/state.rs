//! Worker lifecycle state and handler reports
//!
//! A worker generation moves through `Installing → Installed → Activating →
//! Activated` and stays in `Activated` until the host retires it. The report
//! types here are what the handlers hand back to the host instead of
//! fire-and-forget logging: captured failures ride along in the report while
//! the lifecycle itself keeps going.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::http::HttpResponse;

/// Lifecycle state of a worker generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Freshly constructed; install() has not run
    Installing,
    /// install() completed (precache outcome notwithstanding)
    Installed,
    /// activate() in progress
    Activating,
    /// Serving; fetch() is legal from here on
    Activated,
}

impl WorkerState {
    /// Whether install() is legal from this state
    pub fn can_install(&self) -> bool {
        matches!(self, Self::Installing)
    }

    /// Whether activate() is legal from this state.
    /// Re-activating an activated worker re-runs pruning, so both
    /// `Installed` and `Activated` qualify.
    pub fn can_activate(&self) -> bool {
        matches!(self, Self::Installed | Self::Activated)
    }

    /// Whether fetch() is legal from this state
    pub fn can_serve(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
        }
    }
}

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    /// Served from a cache bucket
    Cache,
    /// Served from the network collaborator
    Network,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Result of one fetch() call
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// The response handed back to the caller
    pub response: HttpResponse,

    /// Cache hit or network
    pub source: FetchSource,

    /// Whether a copy was written to the current bucket on this call
    pub stored: bool,
}

/// Result of install(): what the precache run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    /// Bucket the precache targeted
    pub bucket: String,

    /// Manifest entries requested
    pub requested: usize,

    /// Responses fetched and accepted as cacheable
    pub fetched: usize,

    /// Entries actually written to the bucket
    pub stored: usize,

    /// First failure encountered, if any; the bucket may be empty
    /// (fetch-phase failure) or partial (store-phase failure)
    pub failure: Option<String>,
}

impl InstallReport {
    /// Whether the whole precache run landed
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of activate(): what pruning did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateReport {
    /// The bucket name that survives (the current version)
    pub retained: String,

    /// Stale buckets deleted in this run
    pub deleted: Vec<String>,

    /// Per-bucket deletion failures, as messages; deletion continues
    /// past them
    pub failures: Vec<String>,

    /// Whether pruning ran at all (false when disabled by config)
    pub pruned: bool,
}

impl ActivateReport {
    /// Whether pruning completed without deletion failures
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Snapshot of serving counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeStats {
    /// GET requests answered from cache
    pub hits: u64,
    /// GET requests that went to network
    pub misses: u64,
    /// Non-GET requests forwarded untouched
    pub passthroughs: u64,
    /// Responses opportunistically written to the bucket
    pub stored: u64,
    /// Cache lookups that failed and fell through to network
    pub lookup_faults: u64,
}

impl ServeStats {
    /// Cache hit rate over intercepted GETs (0.0 when nothing served yet)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
