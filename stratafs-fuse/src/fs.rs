//! The fuser adapter: kernel requests in, VFS operations out.
//!
//! FUSE callbacks arrive on the session thread, so every VFS call crosses
//! into the async world through a captured runtime handle. The bridge is
//! read-only: it serves `lookup`, `getattr`, `readdir` and whole-object
//! `read`.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use fuser::{FileAttr, FileType, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, Request};
use stratafs::{read_to_end, File, FileInfo, Filesystem, OpenFlags, VfsResult};

use crate::error::errno_for;
use crate::inode::InodeTable;

/// Attribute cache TTL handed to the kernel
const TTL: Duration = Duration::from_secs(1);

pub struct VfsBridge {
    root: Arc<dyn Filesystem>,
    inodes: Arc<InodeTable>,
    runtime: tokio::runtime::Handle,
    uid: u32,
    gid: u32,
}

impl VfsBridge {
    pub fn new(root: Arc<dyn Filesystem>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            root,
            inodes: Arc::new(InodeTable::new()),
            runtime,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    /// Run a VFS future to completion, mapping failures to an errno
    fn block_on<T>(&self, fut: impl std::future::Future<Output = VfsResult<T>>) -> Result<T, i32> {
        self.runtime.block_on(fut).map_err(|err| {
            tracing::debug!(error = %err, "vfs operation failed");
            errno_for(&err)
        })
    }

    fn attr_for(&self, inode: u64, info: &FileInfo) -> FileAttr {
        let mtime = info.modified.unwrap_or(UNIX_EPOCH);
        let (kind, perm, size) = if info.is_dir {
            (FileType::Directory, 0o777, 0)
        } else {
            (FileType::RegularFile, 0o444, info.size)
        };
        FileAttr {
            ino: inode,
            size,
            blocks: size.div_ceil(512),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: UNIX_EPOCH,
            kind,
            perm,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

impl fuser::Filesystem for VfsBridge {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = join(&parent_path, name);

        let root = self.root.clone();
        let result = {
            let path = path.clone();
            self.block_on(async move { root.stat(&path).await })
        };
        match result {
            Ok(info) => {
                let inode = self.inodes.get_or_allocate(&path);
                tracing::debug!(parent, name, inode, "lookup");
                reply.entry(&TTL, &self.attr_for(inode, &info), 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let root = self.root.clone();
        match self.block_on(async move { root.stat(&path).await }) {
            Ok(info) => reply.attr(&TTL, &self.attr_for(ino, &info)),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if offset > 0 {
            reply.ok();
            return;
        }
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        if reply.add(ino, 0, FileType::Directory, ".") {
            reply.ok();
            return;
        }
        if reply.add(ino, 1, FileType::Directory, "..") {
            reply.ok();
            return;
        }

        let root = self.root.clone();
        let entries = {
            let path = path.clone();
            self.block_on(async move { root.read_dir(&path).await })
        };
        let entries = match entries {
            Ok(entries) => entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        tracing::debug!(ino, count = entries.len(), "readdir");

        for (idx, info) in entries.iter().enumerate() {
            let child = self.inodes.get_or_allocate(&join(&path, &info.name));
            let kind = if info.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            if reply.add(child, (idx + 2) as i64, kind, &info.name) {
                break;
            }
        }
        reply.ok();
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        // whole-object read, then slice the requested window
        let root = self.root.clone();
        let data = self.block_on(async move {
            let mut file = root.open_file(&path, OpenFlags::read_only(), 0).await?;
            let data = read_to_end(&mut *file).await?;
            file.close().await?;
            Ok(data)
        });
        match data {
            Ok(data) => {
                let start = (offset.max(0) as usize).min(data.len());
                let end = (start + size as usize).min(data.len());
                reply.data(&data[start..end]);
            }
            Err(errno) => reply.error(errno),
        }
    }
}
