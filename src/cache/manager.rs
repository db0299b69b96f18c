//! Per-namespace cache preference list.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use reqwest::Url;
use tracing::debug;

use super::endpoint::CacheEndpoint;
use crate::path::ObjectPath;
use crate::{PelicanError, Result};

/// Ordered list of caches willing to serve one namespace.
///
/// Index 0 is the preferred cache and is used until it is reported bad via
/// [`mark_bad`](Self::mark_bad). The list is de-duplicated at construction
/// (the director occasionally returns the same cache twice) and only ever
/// shrinks afterwards.
///
/// The lock is per manager, so marking a cache bad in one namespace never
/// blocks lookups in another. It is never held across an await point.
#[derive(Debug)]
pub struct CacheManager {
    caches: RwLock<Vec<CacheEndpoint>>,
}

impl CacheManager {
    /// Build a manager from cache URLs in order of preference.
    ///
    /// Each URL is normalized to `scheme://host[:port]`; the first occurrence
    /// of an endpoint wins. Fails with [`PelicanError::Configuration`] on an
    /// unparseable URL or an empty result.
    pub fn new<I, S>(ordered_urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = ordered_urls
            .into_iter()
            .map(|url| CacheEndpoint::parse(url.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::from_endpoints(endpoints)
    }

    /// Build a manager from already-normalized endpoints.
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = CacheEndpoint>) -> Result<Self> {
        let mut seen = HashSet::new();
        let caches: Vec<CacheEndpoint> = endpoints
            .into_iter()
            .filter(|endpoint| seen.insert(endpoint.as_str().to_string()))
            .collect();
        if caches.is_empty() {
            return Err(PelicanError::Configuration(
                "cache list is empty".to_string(),
            ));
        }
        Ok(Self {
            caches: RwLock::new(caches),
        })
    }

    /// URL of `object` on the currently preferred cache.
    pub fn get_preferred(&self, object: &ObjectPath) -> Result<Url> {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        let preferred = caches.first().ok_or_else(|| {
            PelicanError::NoAvailableSource(format!("every cache for {} has failed", object.path()))
        })?;
        preferred.object_url(object)
    }

    /// Remove the cache that served `full_url`.
    ///
    /// Matching is by normalized endpoint, so any object URL on the cache
    /// will do. Returns `false` (and changes nothing) when the cache is not
    /// in the list or the URL cannot be parsed.
    pub fn mark_bad(&self, full_url: &str) -> bool {
        let Ok(bad) = CacheEndpoint::parse(full_url) else {
            debug!(url = full_url, "ignoring unparseable bad-cache report");
            return false;
        };
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        match caches.iter().position(|cache| *cache == bad) {
            Some(idx) => {
                caches.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the current list, most preferred first.
    pub fn caches(&self) -> Vec<CacheEndpoint> {
        self.caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of caches still considered healthy.
    pub fn len(&self) -> usize {
        self.caches.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether every cache has been marked bad.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
