//! Mount router: composes backends under path prefixes.
//!
//! A [`MountFs`] owns an ordered table of `(prefix, filesystem)` bindings and
//! forwards each operation to the deepest binding whose prefix matches the
//! requested path, after stripping the matched prefix (a leading `/` is
//! always kept). The root binding at `/` is installed at construction and
//! matches whenever nothing deeper does.
//!
//! Listing a directory additionally surfaces synthetic entries for mount
//! points grafted directly below it, so `read_dir("/")` shows `os` and `s3`
//! even when the root backend has no such entries. Real entries win over
//! synthetic ones of the same name.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{VfsError, VfsResult};
use crate::fs::{File, Filesystem};
use crate::types::{FileInfo, OpenFlags};

/// Filesystem composed from other filesystems via a mount table
pub struct MountFs {
    /// Bindings sorted longest-prefix-first; the last entry is the root at `/`
    mounts: RwLock<Vec<Mount>>,
}

#[derive(Clone)]
struct Mount {
    prefix: String,
    fs: Arc<dyn Filesystem>,
}

/// Collapse runs of `/`, force a leading `/`, drop any trailing `/`
/// (except for the root path itself).
pub(crate) fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for seg in path.split('/') {
        if !seg.is_empty() {
            if out.len() > 1 {
                out.push('/');
            }
            out.push_str(seg);
        }
    }
    out
}

/// Normalize a mount prefix: single leading `/`, single trailing `/`,
/// collapsed internal runs.
fn normalize_prefix(prefix: &str) -> String {
    let mut p = normalize_path(prefix);
    if !p.ends_with('/') {
        p.push('/');
    }
    p
}

/// Split a normalized prefix into the path of its parent directory and the
/// mount-point name. The root prefix has neither.
fn split_prefix(prefix: &str) -> Option<(&str, &str)> {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(0) => Some(("/", &trimmed[1..])),
        Some(i) => Some((&trimmed[..i], &trimmed[i + 1..])),
        None => None,
    }
}

impl MountFs {
    /// Create a router with `root` bound at `/`
    pub fn new(root: Arc<dyn Filesystem>) -> Self {
        Self {
            mounts: RwLock::new(vec![Mount {
                prefix: "/".to_string(),
                fs: root,
            }]),
        }
    }

    /// Graft `fs` into the tree at `prefix`
    ///
    /// The prefix is normalized before registration. Fails with
    /// [`VfsError::AlreadyExists`] when the prefix is already bound.
    pub fn mount(&self, fs: Arc<dyn Filesystem>, prefix: &str) -> VfsResult<()> {
        let prefix = normalize_prefix(prefix);
        let mut mounts = self.mounts.write().unwrap();
        if mounts.iter().any(|m| m.prefix == prefix) {
            return Err(VfsError::AlreadyExists { path: prefix });
        }
        mounts.push(Mount { prefix, fs });
        mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(())
    }

    /// Resolve `path` to its deepest matching binding and the stripped path
    /// to delegate with.
    fn resolve(&self, path: &str) -> (Mount, String) {
        let p = normalize_path(path);
        let mounts = self.mounts.read().unwrap();
        for mount in mounts.iter() {
            if mount.prefix == "/" {
                // root fallback, matches everything
                return (mount.clone(), p);
            }
            // the mount point itself resolves to the backend's root
            if p == &mount.prefix[..mount.prefix.len() - 1] {
                return (mount.clone(), "/".to_string());
            }
            if p.starts_with(&mount.prefix) {
                let stripped = p[mount.prefix.len() - 1..].to_string();
                return (mount.clone(), stripped);
            }
        }
        unreachable!("mount table always contains the root binding");
    }

    /// Names of mount points whose parent directory is `path`
    fn mount_points_under(&self, path: &str) -> Vec<String> {
        let mounts = self.mounts.read().unwrap();
        mounts
            .iter()
            .filter_map(|m| split_prefix(&m.prefix))
            .filter(|(parent, _)| *parent == path)
            .map(|(_, name)| name.to_string())
            .collect()
    }
}

#[async_trait]
impl Filesystem for MountFs {
    fn path_separator(&self) -> u8 {
        b'/'
    }

    async fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<Box<dyn File>> {
        let (mount, stripped) = self.resolve(path);
        mount.fs.open_file(&stripped, flags, mode).await
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let (mount, stripped) = self.resolve(path);
        mount.fs.remove(&stripped).await
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let (from_mount, from_stripped) = self.resolve(from);
        let (to_mount, to_stripped) = self.resolve(to);
        if from_mount.prefix != to_mount.prefix {
            return Err(VfsError::CrossMount {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        from_mount.fs.rename(&from_stripped, &to_stripped).await
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let (mount, stripped) = self.resolve(path);
        mount.fs.mkdir(&stripped, mode).await
    }

    async fn stat(&self, path: &str) -> VfsResult<FileInfo> {
        let (mount, stripped) = self.resolve(path);
        mount.fs.stat(&stripped).await
    }

    async fn lstat(&self, path: &str) -> VfsResult<FileInfo> {
        let (mount, stripped) = self.resolve(path);
        mount.fs.lstat(&stripped).await
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<FileInfo>> {
        let p = normalize_path(path);
        let (mount, stripped) = self.resolve(&p);
        let junctions = self.mount_points_under(&p);
        let mut entries = match mount.fs.read_dir(&stripped).await {
            Ok(entries) => entries,
            // a junction-only directory need not exist on the backend
            Err(e) if e.is_not_found() && !junctions.is_empty() => Vec::new(),
            Err(e) => return Err(e),
        };
        let seen: HashSet<String> = entries.iter().map(|e| e.name.clone()).collect();
        for name in junctions {
            if !seen.contains(&name) {
                entries.push(FileInfo::directory(name));
            }
        }
        Ok(entries)
    }
}
