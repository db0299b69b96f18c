//! The federation filesystem facade.
//!
//! Every data operation goes through the [`FailoverExecutor`]: the path is
//! resolved to a cache (or origin) URL, the [`TransferBackend`] performs the
//! call, and a failure marks that cache bad before the error is returned.
//! Directory operations go to the director's dirlist host instead.
//!
//! Paths may be bare (`/ns/obj`) or federation URLs (`pelican://host/ns/obj`,
//! `osdf:///ns/obj`). Paths in returned metadata never carry a scheme or
//! host.

pub mod builder;
pub mod executor;
pub mod reader;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use tracing::instrument;

use crate::cache::NamespaceCacheRegistry;
use crate::config::FederationConfig;
use crate::director::{DirectorClient, DiscoveryResult};
use crate::path::{FederationPath, ObjectPath};
use crate::telemetry;
use crate::transfer::{ByteRange, ObjectInfo, TransferBackend};
use crate::Result;

pub use builder::PelicanFileSystemBuilder;
pub use executor::FailoverExecutor;
pub use reader::ObjectReader;

/// Read access to a Pelican federation.
///
/// Cheap to clone; clones share routing state.
#[derive(Clone)]
pub struct PelicanFileSystem {
    executor: Arc<FailoverExecutor>,
    backend: Arc<dyn TransferBackend>,
}

impl PelicanFileSystem {
    /// Start configuring a filesystem.
    pub fn builder() -> PelicanFileSystemBuilder {
        PelicanFileSystemBuilder::new()
    }

    /// Build a filesystem from declarative configuration.
    pub fn from_config(config: &FederationConfig) -> Result<Self> {
        PelicanFileSystemBuilder::from(config).build()
    }

    pub(crate) fn from_parts(
        executor: Arc<FailoverExecutor>,
        backend: Arc<dyn TransferBackend>,
    ) -> Self {
        Self { executor, backend }
    }

    pub fn executor(&self) -> &Arc<FailoverExecutor> {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<NamespaceCacheRegistry> {
        self.executor.registry()
    }

    pub fn director(&self) -> &Arc<DirectorClient> {
        self.executor.director()
    }

    pub fn backend(&self) -> &Arc<dyn TransferBackend> {
        &self.backend
    }

    /// Read a whole object.
    pub async fn cat_file(&self, path: &str) -> Result<Vec<u8>> {
        self.cat_file_range(path, None).await
    }

    /// Read a byte range of an object.
    #[instrument(skip(self), fields(operation = "cat_file"))]
    pub async fn cat_file_range(&self, path: &str, range: Option<ByteRange>) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result: Result<Vec<u8>> = async {
            let object = self.object(path)?;
            let backend = &self.backend;
            self.executor
                .run(&object, |url| async move { backend.cat_file(&url, range).await })
                .await
        }
        .await;
        record_operation("cat_file", start, result.is_ok());
        result
    }

    /// Read several objects concurrently, in input order.
    ///
    /// If any read fails, every cache used by the batch is marked bad and
    /// the first error is returned.
    #[instrument(skip(self, paths), fields(operation = "cat_many"))]
    pub async fn cat_many<I, S>(&self, paths: I) -> Result<Vec<Vec<u8>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = Instant::now();
        let result: Result<Vec<Vec<u8>>> = async {
            let objects = paths
                .into_iter()
                .map(|p| self.object(p.as_ref()))
                .collect::<Result<Vec<_>>>()?;
            let backend = &self.backend;
            self.executor
                .run_batch(&objects, |url| async move { backend.cat_file(&url, None).await })
                .await
        }
        .await;
        record_operation("cat_many", start, result.is_ok());
        result
    }

    /// Whether an object exists.
    #[instrument(skip(self), fields(operation = "exists"))]
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let start = Instant::now();
        let result: Result<bool> = async {
            let object = self.object(path)?;
            let backend = &self.backend;
            self.executor
                .run(&object, |url| async move { backend.exists(&url).await })
                .await
        }
        .await;
        record_operation("exists", start, result.is_ok());
        result
    }

    /// Metadata of an object.
    #[instrument(skip(self), fields(operation = "info"))]
    pub async fn info(&self, path: &str) -> Result<ObjectInfo> {
        let start = Instant::now();
        let result: Result<ObjectInfo> = async {
            let object = self.object(path)?;
            let backend = &self.backend;
            self.executor
                .run(&object, |url| async move { backend.info(&url).await })
                .await
                .map(ObjectInfo::into_federation_relative)
        }
        .await;
        record_operation("info", start, result.is_ok());
        result
    }

    /// Download an object to `dest`, returning the bytes written.
    #[instrument(skip(self, dest), fields(operation = "get_file"))]
    pub async fn get_file(&self, path: &str, dest: &Path) -> Result<u64> {
        let start = Instant::now();
        let result: Result<u64> = async {
            let object = self.object(path)?;
            let backend = &self.backend;
            self.executor
                .run(&object, |url| async move { backend.get_file(&url, dest).await })
                .await
        }
        .await;
        record_operation("get_file", start, result.is_ok());
        result
    }

    /// Open an object for positioned reads.
    #[instrument(skip(self), fields(operation = "open"))]
    pub async fn open(&self, path: &str) -> Result<ObjectReader> {
        let start = Instant::now();
        let result: Result<ObjectReader> = async {
            let object = self.object(path)?;
            let url = self.executor.resolve(&object).await?;
            Ok(ObjectReader::new(
                self.executor.clone(),
                self.backend.clone(),
                object,
                url,
            ))
        }
        .await;
        record_operation("open", start, result.is_ok());
        result
    }

    /// List a directory.
    #[instrument(skip(self), fields(operation = "ls"))]
    pub async fn ls(&self, path: &str) -> Result<Vec<ObjectInfo>> {
        let start = Instant::now();
        let result: Result<Vec<ObjectInfo>> = async {
            let object = self.object(path)?;
            let backend = &self.backend;
            let entries = self
                .executor
                .run_dirlist(&object, |url| async move { backend.ls(&url).await })
                .await?;
            Ok(entries
                .into_iter()
                .map(ObjectInfo::into_federation_relative)
                .collect())
        }
        .await;
        record_operation("ls", start, result.is_ok());
        result
    }

    /// Whether `path` is a directory.
    #[instrument(skip(self), fields(operation = "isdir"))]
    pub async fn isdir(&self, path: &str) -> Result<bool> {
        let start = Instant::now();
        let result: Result<bool> = async {
            let object = self.object(path)?;
            let backend = &self.backend;
            self.executor
                .run_dirlist(&object, |url| async move { backend.isdir(&url).await })
                .await
        }
        .await;
        record_operation("isdir", start, result.is_ok());
        result
    }

    /// Whether `path` is not a directory.
    pub async fn isfile(&self, path: &str) -> Result<bool> {
        Ok(!self.isdir(path).await?)
    }

    /// The URL a data operation on `path` would use right now.
    pub async fn resolve(&self, path: &str) -> Result<Url> {
        let object = self.object(path)?;
        self.executor.resolve(&object).await
    }

    /// The director's origin URL for `path`.
    pub async fn origin_url(&self, path: &str) -> Result<Url> {
        let object = self.object(path)?;
        self.director().get_origin_url(&object).await
    }

    /// The director's ranked caches for `path`, without probing.
    pub async fn cache_candidates(&self, path: &str) -> Result<DiscoveryResult> {
        let object = self.object(path)?;
        self.director().get_cache_candidates(&object).await
    }

    /// Classify `path` and bind or check its federation.
    fn object(&self, path: &str) -> Result<ObjectPath> {
        match FederationPath::parse(path)? {
            FederationPath::Path(object) => Ok(object),
            FederationPath::FederationUrl { discovery, object } => {
                self.director().bind_federation(&discovery)?;
                Ok(object)
            }
        }
    }
}

impl std::fmt::Debug for PelicanFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PelicanFileSystem")
            .field("backend", &self.backend.name())
            .field("direct_reads", &self.executor.direct_reads())
            .finish_non_exhaustive()
    }
}

fn record_operation(operation: &'static str, start: Instant, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(telemetry::OPERATIONS_TOTAL,
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::OPERATION_DURATION_SECONDS,
        "operation" => operation,
    )
    .record(start.elapsed().as_secs_f64());
}
