//! Error types shared by every filesystem backend.
//!
//! All operations on [`Filesystem`](crate::fs::Filesystem) and
//! [`File`](crate::fs::File) report failures through [`VfsError`]. The enum is
//! `Clone` on purpose: read handles latch their first failure and return it on
//! every subsequent call, and a fatal multipart upload error is re-surfaced by
//! both `write` and `close`.

use std::io;
use thiserror::Error;

/// Result type alias for VFS operations
pub type VfsResult<T> = std::result::Result<T, VfsError>;

/// Unified error type for VFS operations
#[derive(Debug, Clone, Error)]
pub enum VfsError {
    /// Target path does not exist on the backend
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Operation is not implemented by this backend
    #[error("operation '{operation}' not supported by {backend} backend")]
    NotSupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Network or HTTP client failure below the protocol layer
    #[error("transport error: {0}")]
    Transport(String),

    /// Server returned an unexpected status or a malformed body
    #[error("protocol error (status {status}): {message}")]
    Protocol {
        status: u16,
        message: String,
        /// Excerpt of the response body, for diagnostics
        body: String,
    },

    /// Locally computed MD5 does not match the server-reported ETag
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },

    /// Rename spans two different mounts
    #[error("rename across mount boundaries: {from} -> {to}")]
    CrossMount { from: String, to: String },

    /// Mount prefix collision, or exclusive create of an existing path
    #[error("already exists: {path}")]
    AlreadyExists { path: String },

    /// The operation was aborted, either explicitly or via cancellation
    #[error("operation aborted")]
    Aborted,

    /// Upload would exceed the multipart part-count ceiling
    #[error("object exceeds {max_parts} parts of {part_size} bytes each")]
    TooLarge { max_parts: i32, part_size: usize },

    /// Host filesystem failure that maps to no more specific kind
    #[error("I/O error: {0}")]
    Io(String),
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        VfsError::NotFound { path: path.into() }
    }

    pub fn not_supported(backend: &'static str, operation: &'static str) -> Self {
        VfsError::NotSupported { backend, operation }
    }

    pub(crate) fn protocol(status: u16, message: impl Into<String>, body: impl Into<String>) -> Self {
        VfsError::Protocol {
            status,
            message: message.into(),
            body: body.into(),
        }
    }

    /// Check if this error indicates the target was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound { .. })
    }

    /// Check if this error indicates an unsupported operation
    pub fn is_not_supported(&self) -> bool {
        matches!(self, VfsError::NotSupported { .. })
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound {
                path: String::new(),
            },
            io::ErrorKind::AlreadyExists => VfsError::AlreadyExists {
                path: String::new(),
            },
            _ => VfsError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: VfsError = io_err.into();
        assert!(err.is_not_found());

        let io_err = io::Error::new(io::ErrorKind::AlreadyExists, "exists");
        let err: VfsError = io_err.into();
        assert!(matches!(err, VfsError::AlreadyExists { .. }));

        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: VfsError = io_err.into();
        assert!(matches!(err, VfsError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let err = VfsError::not_supported("s3", "seek");
        assert_eq!(
            err.to_string(),
            "operation 'seek' not supported by s3 backend"
        );

        let err = VfsError::protocol(500, "could not upload part 3", "<Error/>");
        assert_eq!(
            err.to_string(),
            "protocol error (status 500): could not upload part 3"
        );
    }

    #[test]
    fn test_error_clone_keeps_kind() {
        let err = VfsError::not_found("/a/b");
        let clone = err.clone();
        assert!(clone.is_not_found());
    }
}
