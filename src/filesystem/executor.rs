//! Resolve-call-feedback wrapper around backend operations.
//!
//! # Resolution
//!
//! ```text
//!  direct reads ──────────────────────────────► director origin URL
//!
//!  registry hit (non-empty manager) ──────────► manager.get_preferred(path)
//!
//!  registry miss ──► director candidates ──► splice preferred caches
//!                                              │
//!                                              ▼
//!                                       probe in order ──► register manager
//!                                                            under namespace
//! ```
//!
//! # Feedback
//!
//! A failed backend call marks the cache that served it bad in the manager
//! owning the object's path, then returns the backend's error untouched.
//! The next call for that namespace resolves to the next cache in line.
//! Nothing here retries.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{join_all, try_join_all};
use reqwest::Url;
use tracing::{debug, warn};

use crate::cache::{CacheManager, NamespaceCacheRegistry};
use crate::director::DirectorClient;
use crate::path::ObjectPath;
use crate::probe::{CacheProber, PreferredCache, needs_discovery, splice_candidates};
use crate::telemetry;
use crate::Result;

/// Namespace preferred-only cache lists are registered under.
pub const ROOT_NAMESPACE: &str = "/";

/// Routes object operations to a cache (or origin) and feeds failures back.
pub struct FailoverExecutor {
    director: Arc<DirectorClient>,
    registry: Arc<NamespaceCacheRegistry>,
    prober: CacheProber,
    preferred: Vec<PreferredCache>,
    direct_reads: bool,
}

impl FailoverExecutor {
    pub fn new(
        director: Arc<DirectorClient>,
        registry: Arc<NamespaceCacheRegistry>,
        prober: CacheProber,
        preferred: Vec<PreferredCache>,
        direct_reads: bool,
    ) -> Self {
        Self {
            director,
            registry,
            prober,
            preferred,
            direct_reads,
        }
    }

    pub fn director(&self) -> &Arc<DirectorClient> {
        &self.director
    }

    pub fn registry(&self) -> &Arc<NamespaceCacheRegistry> {
        &self.registry
    }

    pub fn direct_reads(&self) -> bool {
        self.direct_reads
    }

    pub fn preferred(&self) -> &[PreferredCache] {
        &self.preferred
    }

    /// The URL a data operation on `object` should use.
    pub async fn resolve(&self, object: &ObjectPath) -> Result<Url> {
        if self.direct_reads {
            return self.director.get_origin_url(object).await;
        }

        if let Some(manager) = self.registry.lookup(object.path()) {
            metrics::counter!(telemetry::NAMESPACE_CACHE_HITS_TOTAL).increment(1);
            return manager.get_preferred(object);
        }
        metrics::counter!(telemetry::NAMESPACE_CACHE_MISSES_TOTAL).increment(1);

        self.discover(object).await
    }

    /// Resolve `object`, run `op` against the URL, and mark the cache bad if
    /// `op` fails.
    pub async fn run<T, F, Fut>(&self, object: &ObjectPath, op: F) -> Result<T>
    where
        F: FnOnce(Url) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let url = self.resolve(object).await?;
        match op(url.clone()).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(path = object.path(), cache = %url, error = %e, "operation failed on cache");
                self.mark_bad(object, &url);
                Err(e)
            }
        }
    }

    /// Resolve every object concurrently and run `op` on each URL.
    ///
    /// If any call fails, every resolved URL is marked bad against its own
    /// path and the first error (in input order) is returned.
    pub async fn run_batch<T, F, Fut>(&self, objects: &[ObjectPath], op: F) -> Result<Vec<T>>
    where
        F: Fn(Url) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let urls = try_join_all(objects.iter().map(|object| self.resolve(object))).await?;
        let results = join_all(urls.iter().cloned().map(&op)).await;

        if results.iter().any(|r| r.is_err()) {
            for (object, url) in objects.iter().zip(&urls) {
                self.mark_bad(object, url);
            }
        }
        results.into_iter().collect()
    }

    /// Resolve the dirlist host for `object` and run `op` on it.
    ///
    /// Failures are returned as-is; cache managers are not involved.
    pub async fn run_dirlist<T, F, Fut>(&self, object: &ObjectPath, op: F) -> Result<T>
    where
        F: FnOnce(Url) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let url = self.director.get_dirlist_endpoint(object).await?;
        op(url).await
    }

    /// Report that `url`, resolved for `object`, failed.
    pub fn mark_bad(&self, object: &ObjectPath, url: &Url) -> bool {
        // Origins are not in any cache list.
        if self.direct_reads {
            return false;
        }
        self.registry.remove_cache_from(object.path(), url.as_str())
    }

    async fn discover(&self, object: &ObjectPath) -> Result<Url> {
        let (candidates, namespace) = if needs_discovery(&self.preferred) {
            let discovered = self.director.get_cache_candidates(object).await?;
            let candidates = splice_candidates(&self.preferred, object, &discovered.candidates)?;
            (candidates, discovered.namespace)
        } else {
            let candidates = splice_candidates(&self.preferred, object, &[])?;
            (candidates, ROOT_NAMESPACE.to_string())
        };

        let working = self.prober.find_working_cache(&candidates).await?;
        let manager = CacheManager::new(working.cache_list.iter().map(Url::as_str))?;
        debug!(
            path = object.path(),
            namespace = %namespace,
            cache = %working.url,
            "selected working cache"
        );
        self.registry.insert(namespace, Arc::new(manager));
        Ok(working.url)
    }
}
