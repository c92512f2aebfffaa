//! Composable virtual filesystem.
//!
//! `stratafs` exposes heterogeneous storage backends — in-memory, the host
//! operating system, and S3-compatible object stores — behind one
//! [`Filesystem`]/[`File`] contract, and composes them through a
//! longest-prefix [`MountFs`] mount table:
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratafs::{MemFs, MountFs, OsFs};
//! use stratafs::s3::{S3Config, S3Fs};
//!
//! # fn main() -> Result<(), stratafs::VfsError> {
//! let mount = MountFs::new(Arc::new(MemFs::new()));
//! mount.mount(Arc::new(OsFs::new()), "/os/")?;
//! mount.mount(
//!     Arc::new(S3Fs::new(S3Config::new(
//!         "bucket", "access-key", "secret", "127.0.0.1:9000",
//!     ))?),
//!     "/s3/",
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! Every path crossing the contract is absolute and `/`-separated; the
//! router strips the matched mount prefix before delegating and never
//! reshapes the remainder. See the `stratafs-fuse` crate for re-exporting a
//! composed tree to the kernel.

pub mod error;
pub mod fs;
pub mod memfs;
pub mod mountfs;
pub mod osfs;
pub mod s3;
pub mod types;

pub use error::{VfsError, VfsResult};
pub use fs::{read_to_end, File, Filesystem};
pub use memfs::MemFs;
pub use mountfs::MountFs;
pub use osfs::OsFs;
pub use types::{FileInfo, OpenFlags};
