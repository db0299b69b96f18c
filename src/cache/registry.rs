//! Namespace prefix → cache manager registry.
//!
//! # Architecture
//!
//! - Moka-backed LRU + TTL cache keyed on the namespace prefix the director
//!   reported (e.g. `/ospool/data`).
//! - Lookups scan the live prefixes longest-first, so `/a/b` wins over `/a`
//!   for `/a/b/c`.
//! - Values are `Arc<CacheManager>`; marking a cache bad locks only that
//!   manager, never the registry.
//! - Concurrent discoveries for the same prefix race benignly: the last
//!   insert wins and the loser's manager is dropped.

use std::sync::Arc;
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::debug;

use super::manager::CacheManager;
use crate::telemetry;

/// Configuration for the namespace registry.
///
/// ```rust
/// # use pelican_client::RegistryConfig;
/// # use std::time::Duration;
/// let config = RegistryConfig::new()
///     .max_entries(100)
///     .ttl(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum registered namespaces. Default: 50.
    pub max_entries: u64,
    /// Time-to-live of a namespace entry. Default: 15 minutes.
    pub ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl RegistryConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of registered namespaces.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for namespace entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Thread-safe map from namespace prefix to its [`CacheManager`].
pub struct NamespaceCacheRegistry {
    entries: Cache<String, Arc<CacheManager>>,
}

impl NamespaceCacheRegistry {
    /// Create an empty registry from the given configuration.
    pub fn new(config: &RegistryConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { entries }
    }

    /// Find the manager of the longest registered prefix of `path`.
    ///
    /// Expired entries are absent. A manager whose caches have all been
    /// marked bad counts as a miss so the caller rediscovers; the stale
    /// entry is replaced by the next insert for that prefix.
    pub fn lookup(&self, path: &str) -> Option<Arc<CacheManager>> {
        for prefix in self.matching_prefixes(path) {
            let Some(manager) = self.entries.get(prefix.as_str()) else {
                continue; // expired between scan and get
            };
            if manager.is_empty() {
                debug!(prefix = %prefix, path, "namespace has no healthy caches left");
                return None;
            }
            return Some(manager);
        }
        None
    }

    /// Register (or replace) the manager for `prefix`.
    pub fn insert(&self, prefix: impl Into<String>, manager: Arc<CacheManager>) {
        let prefix = prefix.into();
        debug!(prefix = %prefix, caches = manager.len(), "registering namespace caches");
        self.entries.insert(prefix, manager);
    }

    /// Report that `bad_cache_url`, obtained while serving `path`, failed.
    ///
    /// The owning manager is found from `path` (the object path the caller
    /// resolved), not from the URL. Returns whether a cache was removed.
    pub fn remove_cache_from(&self, path: &str, bad_cache_url: &str) -> bool {
        let Some(prefix) = self.matching_prefixes(path).into_iter().next() else {
            return false;
        };
        let Some(manager) = self.entries.get(prefix.as_str()) else {
            return false;
        };
        let removed = manager.mark_bad(bad_cache_url);
        if removed {
            metrics::counter!(telemetry::CACHES_MARKED_BAD_TOTAL).increment(1);
            debug!(
                prefix = %prefix,
                cache = bad_cache_url,
                remaining = manager.len(),
                "marked cache bad"
            );
        }
        removed
    }

    /// Registered prefixes, longest first.
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.entries.iter().map(|(k, _)| (*k).clone()).collect();
        sort_longest_first(&mut prefixes);
        prefixes
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    fn matching_prefixes(&self, path: &str) -> Vec<String> {
        let mut prefixes: Vec<String> = self
            .entries
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(prefix, _)| (*prefix).clone())
            .collect();
        sort_longest_first(&mut prefixes);
        prefixes
    }
}

impl Default for NamespaceCacheRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

/// Longer prefixes first; equal lengths in lexical order for determinism.
fn sort_longest_first(prefixes: &mut [String]) {
    prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
}
