//! The polymorphic filesystem contract every backend satisfies.
//!
//! A [`Filesystem`] hands out [`File`] handles; a handle stays valid until it
//! is closed or the filesystem it came from is dropped. Paths crossing this
//! boundary are absolute and use `/` as the separator; backends translate
//! internally (see [`Filesystem::path_separator`]).
//!
//! The contract is deliberately minimal: it says nothing about buffering,
//! caching or concurrency. Callers must assume every operation may perform
//! I/O and may block.

use async_trait::async_trait;
use std::io::SeekFrom;

use crate::error::VfsResult;
use crate::types::{FileInfo, OpenFlags};

/// Uniform interface over heterogeneous storage backends
///
/// Implementors must be `Send + Sync` to support concurrent access. All
/// errors are reported as [`VfsError`](crate::error::VfsError) values;
/// not-found is distinguishable from transport and protocol failures.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// The path separator this backend expects in delegated paths
    fn path_separator(&self) -> u8 {
        b'/'
    }

    /// Open a file handle at `path`
    ///
    /// Backends are free to defer I/O: an S3 handle performs no request
    /// until the first `read` or `write`.
    async fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<Box<dyn File>>;

    /// Remove the file or (empty) directory at `path`
    async fn remove(&self, path: &str) -> VfsResult<()>;

    /// Rename `from` to `to` within this backend
    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Create a directory at `path`
    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()>;

    /// Get metadata for `path`, following symlinks
    async fn stat(&self, path: &str) -> VfsResult<FileInfo>;

    /// Get metadata for `path` without following symlinks
    async fn lstat(&self, path: &str) -> VfsResult<FileInfo>;

    /// List the entries of the directory at `path`
    async fn read_dir(&self, path: &str) -> VfsResult<Vec<FileInfo>>;
}

/// An open file handle
///
/// Backends may not support every capability; `read_at`, `seek`, `truncate`
/// and `sync` return a typed
/// [`NotSupported`](crate::error::VfsError::NotSupported) error rather than
/// silently misbehaving.
#[async_trait]
pub trait File: Send {
    /// Base name of the file
    fn name(&self) -> &str;

    /// Metadata snapshot for this file
    async fn stat(&self) -> VfsResult<FileInfo>;

    /// Read into `buf`, returning the number of bytes read (0 at EOF)
    async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;

    /// Read into `buf` at `offset` without moving the cursor
    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> VfsResult<usize>;

    /// Write `buf`, returning the number of bytes accepted
    async fn write(&mut self, buf: &[u8]) -> VfsResult<usize>;

    /// Move the cursor, returning the new position
    async fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64>;

    /// Truncate or extend the file to `size` bytes
    async fn truncate(&mut self, size: u64) -> VfsResult<()>;

    /// Flush buffered state to the backing store
    async fn sync(&mut self) -> VfsResult<()>;

    /// Close the handle, completing any pending writes
    ///
    /// Closing twice is a no-op.
    async fn close(&mut self) -> VfsResult<()>;
}

impl std::fmt::Debug for dyn File + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").field("name", &self.name()).finish()
    }
}

/// Drain `file` to EOF and return its contents.
pub async fn read_to_end(file: &mut dyn File) -> VfsResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }
    Ok(data)
}
