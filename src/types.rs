//! Common types shared by all filesystem backends.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

bitflags::bitflags! {
    /// Flags for [`Filesystem::open_file`](crate::fs::Filesystem::open_file)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ     = 1;
        const WRITE    = 1 << 1;
        const CREATE   = 1 << 2;
        const TRUNCATE = 1 << 3;
        const APPEND   = 1 << 4;
    }
}

impl OpenFlags {
    /// Open an existing file for reading only
    pub fn read_only() -> Self {
        Self::READ
    }

    /// Create or replace a file for writing
    pub fn write_only() -> Self {
        Self::WRITE | Self::CREATE | Self::TRUNCATE
    }

    /// Open an existing file for reading and writing
    pub fn read_write() -> Self {
        Self::READ | Self::WRITE
    }
}

/// Immutable metadata snapshot for a file or directory
///
/// `name` is always the base name of the entry. Directories report a size of
/// zero. `modified` may be `None` when the backend cannot supply a timestamp.
#[derive(Clone)]
pub struct FileInfo {
    /// Base name of the entry
    pub name: String,

    /// Size in bytes (0 for directories)
    pub size: u64,

    /// Permission bits (e.g. 0o644); the directory property lives in `is_dir`
    pub mode: u32,

    /// Last modification time, if known
    pub modified: Option<SystemTime>,

    /// Is this a directory?
    pub is_dir: bool,

    /// Opaque backend payload (e.g. [`ObjectStat`](crate::s3::ObjectStat) for S3)
    pub sys: Option<Arc<dyn Any + Send + Sync>>,
}

impl FileInfo {
    /// Create metadata for a regular file
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mode: 0o644,
            modified: None,
            is_dir: false,
            sys: None,
        }
    }

    /// Create metadata for a directory
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            mode: 0o755,
            modified: None,
            is_dir: true,
            sys: None,
        }
    }

    /// Builder pattern: set permission bits
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Builder pattern: set modification time
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Builder pattern: attach a backend payload
    pub fn with_sys(mut self, sys: Arc<dyn Any + Send + Sync>) -> Self {
        self.sys = Some(sys);
        self
    }
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mode", &format_args!("{:o}", self.mode))
            .field("modified", &self.modified)
            .field("is_dir", &self.is_dir)
            .field("sys", &self.sys.is_some())
            .finish()
    }
}
