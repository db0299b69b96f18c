//! Positioned reads of one object.

use std::sync::Arc;

use reqwest::Url;

use super::executor::FailoverExecutor;
use crate::path::ObjectPath;
use crate::{PelicanError, Result};
use crate::transfer::{ByteRange, TransferBackend};

/// An open object, returned by [`PelicanFileSystem::open`](super::PelicanFileSystem::open).
///
/// The data URL is chosen once at open time. Each read is a ranged request
/// against it; a failed read marks that cache bad, so the next `open` of
/// the namespace picks another one.
pub struct ObjectReader {
    executor: Arc<FailoverExecutor>,
    backend: Arc<dyn TransferBackend>,
    object: ObjectPath,
    url: Url,
    position: u64,
    eof: bool,
}

impl ObjectReader {
    pub(crate) fn new(
        executor: Arc<FailoverExecutor>,
        backend: Arc<dyn TransferBackend>,
        object: ObjectPath,
        url: Url,
    ) -> Self {
        Self {
            executor,
            backend,
            object,
            url,
            position: 0,
            eof: false,
        }
    }

    /// The URL reads are served from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current read offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move the read offset.
    pub fn seek(&mut self, position: u64) {
        self.position = position;
        self.eof = false;
    }

    /// Read up to `len` bytes from the current offset.
    ///
    /// Returns an empty buffer at end of object.
    pub async fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        if len == 0 || self.eof {
            return Ok(Vec::new());
        }
        let range = ByteRange::new(self.position, Some(self.position + len as u64));
        let data = self.fetch(Some(range)).await?;
        if data.len() < len {
            self.eof = true;
        }
        self.position += data.len() as u64;
        Ok(data)
    }

    /// Read everything from the current offset to the end.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        if self.eof {
            return Ok(Vec::new());
        }
        let range = (self.position > 0).then(|| ByteRange::new(self.position, None));
        let data = self.fetch(range).await?;
        self.position += data.len() as u64;
        self.eof = true;
        Ok(data)
    }

    async fn fetch(&self, range: Option<ByteRange>) -> Result<Vec<u8>> {
        match self.backend.cat_file(&self.url, range).await {
            Ok(data) => Ok(data),
            // Reading at or past the end is not a cache failure.
            Err(PelicanError::Status { status: 416, .. }) if self.position > 0 => Ok(Vec::new()),
            Err(e) => {
                self.executor.mark_bad(&self.object, &self.url);
                Err(e)
            }
        }
    }
}
