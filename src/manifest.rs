//! Cache version and asset manifest
//!
//! The version string and the asset list are injected configuration,
//! generated at build/deploy time — never compile-time constants. A
//! manifest file looks like:
//!
//! ```toml
//! version = "202210160801"
//! assets = ["/index.html", "/site.js", "/resources/app.css"]
//! ```

use crate::error::{ShellcacheError, ShellcacheResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Opaque identifier naming the current cache bucket
///
/// The version is the sole discriminator between the current bucket and
/// stale ones: a new asset set deploys under a new version. Restricted to
/// `[A-Za-z0-9._-]` so versions are always usable as directory names in
/// filesystem-backed stores. Rejection is explicit, never silent
/// sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheVersion(String);

impl CacheVersion {
    /// Create a validated version identifier
    pub fn new(version: impl Into<String>) -> ShellcacheResult<Self> {
        let version = version.into();
        let valid = !version.is_empty()
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        if valid {
            Ok(Self(version))
        } else {
            Err(ShellcacheError::InvalidVersion(version))
        }
    }

    /// The version as a bucket name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CacheVersion {
    type Error = ShellcacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheVersion> for String {
    fn from(version: CacheVersion) -> Self {
        version.0
    }
}

/// The asset set to pre-fetch on install, plus the version it deploys as
///
/// Paths are kept in order and duplicates are preserved — they are
/// wasteful, not incorrect. A duplicate count is logged at debug level so
/// build tooling can be fixed upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetManifest {
    /// The cache version this asset set deploys as
    pub version: CacheVersion,

    /// Ordered resource paths to pre-fetch during install
    pub assets: Vec<String>,
}

impl AssetManifest {
    /// Create a manifest from parts
    pub fn new(version: CacheVersion, assets: Vec<String>) -> Self {
        let manifest = Self { version, assets };
        manifest.log_duplicates();
        manifest
    }

    /// Load a manifest from a TOML file
    pub async fn load(path: impl AsRef<Path>) -> ShellcacheResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ShellcacheError::ManifestNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ShellcacheError::io(format!("reading manifest {}", path.display()), e))?;

        let manifest: Self =
            toml::from_str(&content).map_err(|e| ShellcacheError::ManifestInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        manifest.log_duplicates();
        Ok(manifest)
    }

    /// Parse a manifest from a TOML string
    pub fn from_toml_str(content: &str) -> ShellcacheResult<Self> {
        let manifest: Self = toml::from_str(content)?;
        manifest.log_duplicates();
        Ok(manifest)
    }

    /// Number of asset paths (duplicates included)
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the manifest lists no assets
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn log_duplicates(&self) {
        let mut seen = HashSet::new();
        let duplicates = self
            .assets
            .iter()
            .filter(|path| !seen.insert(path.as_str()))
            .count();

        if duplicates > 0 {
            debug!(
                "Manifest {} lists {} duplicate asset path(s)",
                self.version, duplicates
            );
        }
    }
}
