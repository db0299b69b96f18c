//! Builder for configuring filesystem instances

use std::sync::Arc;
use std::time::Duration;

use super::PelicanFileSystem;
use super::executor::FailoverExecutor;
use crate::Result;
use crate::cache::{NamespaceCacheRegistry, RegistryConfig};
use crate::config::FederationConfig;
use crate::director::{DEFAULT_DIRECTOR_TIMEOUT, DirectorClient};
use crate::probe::{CacheProber, DEFAULT_PROBE_TIMEOUT, PreferredCache};
use crate::transfer::{HttpBackend, TransferBackend};

/// Builder for [`PelicanFileSystem`].
pub struct PelicanFileSystemBuilder {
    discovery_url: Option<String>,
    direct_reads: bool,
    preferred_caches: Vec<String>,
    authorization: Option<String>,
    registry_config: RegistryConfig,
    registry: Option<Arc<NamespaceCacheRegistry>>,
    probe_timeout: Duration,
    director_timeout: Duration,
    transfer_timeout: Option<Duration>,
    backend: Option<Arc<dyn TransferBackend>>,
}

impl Default for PelicanFileSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PelicanFileSystemBuilder {
    pub fn new() -> Self {
        Self {
            discovery_url: None,
            direct_reads: false,
            preferred_caches: Vec::new(),
            authorization: None,
            registry_config: RegistryConfig::default(),
            registry: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            director_timeout: DEFAULT_DIRECTOR_TIMEOUT,
            transfer_timeout: None,
            backend: None,
        }
    }

    /// Federation discovery URL (`pelican://host`, `https://host:port`, ...).
    pub fn discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = Some(url.into());
        self
    }

    /// Read from origins, bypassing caches.
    pub fn direct_reads(mut self, enabled: bool) -> Self {
        self.direct_reads = enabled;
        self
    }

    /// Caches to try before (or instead of) the director's. Include `"+"` to
    /// splice the discovered caches in at that position.
    pub fn preferred_caches<I, S>(mut self, caches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_caches = caches.into_iter().map(Into::into).collect();
        self
    }

    /// `Authorization` header value sent to the director, probes and transfers.
    pub fn authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Size and lifetime of a registry created by [`build`](Self::build).
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Share an existing registry instead of creating one.
    pub fn registry(mut self, registry: Arc<NamespaceCacheRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Timeout of cache probes and dirlist lookups (default: 5s).
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Timeout of discovery and director lookups (default: 30s).
    pub fn director_timeout(mut self, timeout: Duration) -> Self {
        self.director_timeout = timeout;
        self
    }

    /// Timeout of each transfer made by the default HTTP backend.
    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }

    /// Use a custom transfer backend.
    pub fn backend(mut self, backend: Arc<dyn TransferBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build the filesystem.
    ///
    /// Fails with `Configuration` on an unparseable discovery URL or
    /// preferred cache.
    pub fn build(self) -> Result<PelicanFileSystem> {
        let director = DirectorClient::new(self.discovery_url.as_deref())?
            .with_authorization(self.authorization.clone())
            .with_timeout(self.director_timeout)
            .with_dirlist_timeout(self.probe_timeout);
        let prober =
            CacheProber::new(self.probe_timeout)?.with_authorization(self.authorization.clone());
        let preferred = PreferredCache::parse_list(&self.preferred_caches)?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(NamespaceCacheRegistry::new(&self.registry_config)),
        };
        let backend: Arc<dyn TransferBackend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(
                HttpBackend::new(self.transfer_timeout)?.with_authorization(self.authorization),
            ),
        };

        let executor = FailoverExecutor::new(
            Arc::new(director),
            registry,
            prober,
            preferred,
            self.direct_reads,
        );
        Ok(PelicanFileSystem::from_parts(Arc::new(executor), backend))
    }
}

impl From<&FederationConfig> for PelicanFileSystemBuilder {
    fn from(config: &FederationConfig) -> Self {
        let mut builder = PelicanFileSystemBuilder::new()
            .direct_reads(config.direct_reads)
            .preferred_caches(config.preferred_caches.iter().cloned())
            .registry_config(config.registry.to_registry_config())
            .probe_timeout(Duration::from_secs(config.timeouts.probe_secs))
            .director_timeout(Duration::from_secs(config.timeouts.director_secs));
        if let Some(url) = &config.discovery_url {
            builder = builder.discovery_url(url.clone());
        }
        if let Some(value) = &config.authorization {
            builder = builder.authorization(value.clone());
        }
        if let Some(secs) = config.timeouts.transfer_secs {
            builder = builder.transfer_timeout(Duration::from_secs(secs));
        }
        builder
    }
}
