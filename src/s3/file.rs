//! Open-file handle for S3 objects.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{VfsError, VfsResult};
use crate::fs::File;
use crate::types::FileInfo;

use super::reader::ObjectReader;
use super::writer::MultipartWriter;
use super::S3Inner;

/// An open S3 object
///
/// The handle is cheap to create: no request is made until the first `read`
/// or `write`. A handle used for reading streams the whole object once; a
/// handle used for writing runs a multipart upload that is finalized by
/// [`close`](File::close) or cancelled by [`abort`](S3File::abort).
///
/// `read_at`, `seek`, `truncate` and `sync` are not supported on this
/// backend and return a typed error.
pub struct S3File {
    inner: Arc<S3Inner>,
    key: String,
    name: String,
    reader: Option<ObjectReader>,
    writer: Option<MultipartWriter>,
}

impl S3File {
    pub(crate) fn new(inner: Arc<S3Inner>, key: impl Into<String>) -> Self {
        let key = key.into();
        let name = key
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&key)
            .to_string();
        Self {
            inner,
            key,
            name,
            reader: None,
            writer: None,
        }
    }

    /// Abort the in-progress upload, deleting it on the server
    ///
    /// A no-op when nothing has been written, or after `close`/`abort` has
    /// already run.
    pub async fn abort(&mut self) -> VfsResult<()> {
        match &mut self.writer {
            Some(writer) => writer.abort().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl File for S3File {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        self.inner.head(&self.key).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let reader = self
            .reader
            .get_or_insert_with(|| ObjectReader::new(self.inner.clone(), self.key.clone()));
        reader.read(buf).await
    }

    async fn read_at(&mut self, _buf: &mut [u8], _offset: u64) -> VfsResult<usize> {
        Err(VfsError::not_supported("s3", "read_at"))
    }

    async fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        let writer = self
            .writer
            .get_or_insert_with(|| MultipartWriter::new(self.inner.clone(), self.key.clone()));
        writer.write(buf).await
    }

    async fn seek(&mut self, _pos: SeekFrom) -> VfsResult<u64> {
        Err(VfsError::not_supported("s3", "seek"))
    }

    async fn truncate(&mut self, _size: u64) -> VfsResult<()> {
        Err(VfsError::not_supported("s3", "truncate"))
    }

    async fn sync(&mut self) -> VfsResult<()> {
        Err(VfsError::not_supported("s3", "sync"))
    }

    async fn close(&mut self) -> VfsResult<()> {
        match &mut self.writer {
            Some(writer) => writer.close().await,
            None => Ok(()),
        }
    }
}
