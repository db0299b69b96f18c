//! Byte-level transfer backends.
//!
//! The routing layer decides *which* URL serves an object; a
//! [`TransferBackend`] performs the actual I/O against that URL. Backends
//! are plain request/response adaptors: they never retry and never touch
//! routing state. A failed call is reported back to the caller, which marks
//! the cache bad before passing the error on.
//!
//! ```text
//! PelicanFileSystem::cat_file("/ns/obj")
//!        │
//!        ▼
//! FailoverExecutor ── resolve ──► https://cache.example.org/ns/obj
//!        │
//!        ▼
//! TransferBackend::cat_file(url)  ── Err ──► mark_bad(cache) + return Err
//! ```

pub mod http;

use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;

use crate::path::federation_relative;
use crate::{PelicanError, Result};

pub use http::HttpBackend;

/// File or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata of one object or directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    /// Location of the entry. Backends report full URLs; the filesystem
    /// hands out federation-relative paths.
    pub name: String,
    pub size: Option<u64>,
    pub kind: EntryKind,
    pub mimetype: Option<String>,
    pub url: Option<String>,
}

impl ObjectInfo {
    /// A file entry at `name`.
    pub fn file(name: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size,
            kind: EntryKind::File,
            mimetype: None,
            url: None,
        }
    }

    /// A directory entry at `name`.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            kind: EntryKind::Directory,
            mimetype: None,
            url: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Strip scheme and host from `name` and `url`.
    pub fn into_federation_relative(mut self) -> Self {
        self.name = federation_relative(&self.name);
        self.url = self.url.as_deref().map(federation_relative);
        self
    }
}

/// Half-open byte range `[start, end)`; `end = None` reads to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// `Range` header value, or `None` when the range is empty.
    pub fn header_value(&self) -> Option<String> {
        match self.end {
            Some(end) if end <= self.start => None,
            Some(end) => Some(format!("bytes={}-{}", self.start, end - 1)),
            None => Some(format!("bytes={}-", self.start)),
        }
    }

    /// Number of bytes covered, if bounded.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.start))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

/// Byte-level operations against a concrete URL.
///
/// Implementations must be cheap to share (`Arc<dyn TransferBackend>`) and
/// must not retry internally.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Read the object, or a byte range of it.
    async fn cat_file(&self, url: &Url, range: Option<ByteRange>) -> Result<Vec<u8>>;

    /// Whether the object exists.
    async fn exists(&self, url: &Url) -> Result<bool>;

    /// Metadata of the object.
    async fn info(&self, url: &Url) -> Result<ObjectInfo>;

    /// Download the object to `dest`, returning the number of bytes written.
    async fn get_file(&self, url: &Url, dest: &Path) -> Result<u64>;

    /// List a directory.
    async fn ls(&self, url: &Url) -> Result<Vec<ObjectInfo>>;

    /// Whether `url` is a directory.
    ///
    /// Default: a non-empty listing means yes, a missing entry means no.
    async fn isdir(&self, url: &Url) -> Result<bool> {
        match self.ls(url).await {
            Ok(entries) => Ok(!entries.is_empty()),
            Err(PelicanError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
