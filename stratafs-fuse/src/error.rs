//! Mapping from VFS errors to FUSE error codes.

use stratafs::VfsError;

/// Convert a [`VfsError`] to the libc errno reported to the kernel.
pub fn errno_for(err: &VfsError) -> i32 {
    match err {
        VfsError::NotFound { .. } => libc::ENOENT,
        VfsError::NotSupported { .. } => libc::ENOSYS,
        VfsError::CrossMount { .. } => libc::EXDEV,
        VfsError::AlreadyExists { .. } => libc::EEXIST,
        VfsError::Aborted => libc::ECANCELED,
        VfsError::TooLarge { .. } => libc::EFBIG,
        VfsError::Transport(_)
        | VfsError::Protocol { .. }
        | VfsError::Checksum { .. }
        | VfsError::Io(_) => libc::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(errno_for(&VfsError::not_found("/x")), libc::ENOENT);
        assert_eq!(
            errno_for(&VfsError::not_supported("s3", "seek")),
            libc::ENOSYS
        );
        assert_eq!(
            errno_for(&VfsError::CrossMount {
                from: "/a".into(),
                to: "/b".into()
            }),
            libc::EXDEV
        );
        assert_eq!(errno_for(&VfsError::Aborted), libc::ECANCELED);
        assert_eq!(errno_for(&VfsError::Transport("reset".into())), libc::EIO);
    }
}
