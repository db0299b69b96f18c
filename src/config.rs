//! Declarative filesystem configuration.
//!
//! With the `cli` feature, configuration is loaded from TOML with the
//! following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.pelican/config.toml` (user)
//! 3. `/etc/pelican/config.toml` (system)
//!
//! ```toml
//! discovery_url = "pelican://osg-htc.org"
//! direct_reads = false
//! preferred_caches = ["https://cache.example.org:8443", "+"]
//!
//! [registry]
//! max_entries = 50
//! ttl_secs = 900
//!
//! [timeouts]
//! probe_secs = 5
//! director_secs = 30
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::RegistryConfig;
use crate::director::DEFAULT_DIRECTOR_TIMEOUT;
use crate::probe::DEFAULT_PROBE_TIMEOUT;

/// Filesystem configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FederationConfig {
    /// Federation discovery URL; unset binds to the first federation URL used.
    #[serde(default)]
    pub discovery_url: Option<String>,
    /// Read from origins instead of caches.
    #[serde(default)]
    pub direct_reads: bool,
    /// Caches to try first; `"+"` marks where discovered caches go.
    #[serde(default)]
    pub preferred_caches: Vec<String>,
    /// Value of the `Authorization` header sent on every request.
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
}

/// Namespace registry limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySection {
    /// Maximum registered namespaces (default: 50).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Namespace entry lifetime in seconds (default: 900).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl RegistrySection {
    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig::new()
            .max_entries(self.max_entries)
            .ttl(Duration::from_secs(self.ttl_secs))
    }
}

fn default_max_entries() -> u64 {
    RegistryConfig::default().max_entries
}

fn default_ttl_secs() -> u64 {
    RegistryConfig::default().ttl.as_secs()
}

/// Network timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsSection {
    /// Cache probe and dirlist lookup timeout (default: 5).
    #[serde(default = "default_probe_secs")]
    pub probe_secs: u64,
    /// Discovery and director lookup timeout (default: 30).
    #[serde(default = "default_director_secs")]
    pub director_secs: u64,
    /// Whole-transfer timeout; unset means unbounded.
    #[serde(default)]
    pub transfer_secs: Option<u64>,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            probe_secs: default_probe_secs(),
            director_secs: default_director_secs(),
            transfer_secs: None,
        }
    }
}

fn default_probe_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_director_secs() -> u64 {
    DEFAULT_DIRECTOR_TIMEOUT.as_secs()
}

impl FederationConfig {
    /// Candidate config file locations, user first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".pelican").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/pelican/config.toml"));
        paths
    }
}

#[cfg(feature = "cli")]
mod load {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::FederationConfig;
    use crate::{PelicanError, Result};

    impl FederationConfig {
        /// Load configuration from the standard locations.
        ///
        /// Resolution order:
        /// 1. Explicit path (if provided; must exist)
        /// 2. `~/.pelican/config.toml`
        /// 3. `/etc/pelican/config.toml`
        ///
        /// With no explicit path and no file found, returns the defaults.
        pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
            match Self::resolve_config_path(explicit_path)? {
                Some(path) => Self::load_from_file(&path),
                None => Ok(Self::default()),
            }
        }

        /// Parse a TOML config file.
        pub fn load_from_file(path: &Path) -> Result<Self> {
            let content = fs::read_to_string(path).map_err(|e| {
                PelicanError::Configuration(format!("Failed to read config file {path:?}: {e}"))
            })?;
            toml::from_str(&content).map_err(|e| {
                PelicanError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
            })
        }

        fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
            if let Some(path) = explicit {
                if path.exists() {
                    return Ok(Some(path.to_path_buf()));
                }
                return Err(PelicanError::Configuration(format!(
                    "Config file not found: {path:?}"
                )));
            }
            Ok(Self::search_paths().into_iter().find(|p| p.exists()))
        }
    }
}
