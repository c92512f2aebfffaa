//! Bidirectional mapping between FUSE inodes and VFS paths.
//!
//! Inodes are allocated lazily as paths are looked up and stay stable for
//! the lifetime of the mount. Numbers are synthetic; no cross-session
//! uniqueness is guaranteed.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct InodeTable {
    inode_to_path: DashMap<u64, String>,
    path_to_inode: DashMap<String, u64>,
    next_inode: AtomicU64,
}

impl InodeTable {
    /// Create a table with the root inode (1) bound to `/`
    pub fn new() -> Self {
        let table = Self {
            inode_to_path: DashMap::new(),
            path_to_inode: DashMap::new(),
            next_inode: AtomicU64::new(2),
        };
        table.inode_to_path.insert(1, "/".to_string());
        table.path_to_inode.insert("/".to_string(), 1);
        table
    }

    /// Get the existing inode for `path`, or allocate a new one
    pub fn get_or_allocate(&self, path: &str) -> u64 {
        if let Some(inode) = self.path_to_inode.get(path) {
            return *inode;
        }
        let inode = self.next_inode.fetch_add(1, Ordering::SeqCst);
        self.inode_to_path.insert(inode, path.to_string());
        self.path_to_inode.insert(path.to_string(), inode);
        inode
    }

    /// Reverse lookup: the path bound to `inode`, if any
    pub fn path_of(&self, inode: u64) -> Option<String> {
        self.inode_to_path.get(&inode).map(|p| p.value().clone())
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_inode_one() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(1).as_deref(), Some("/"));
        assert_eq!(table.get_or_allocate("/"), 1);
    }

    #[test]
    fn test_allocation_is_stable() {
        let table = InodeTable::new();
        let a = table.get_or_allocate("/a");
        let b = table.get_or_allocate("/b");
        assert_ne!(a, b);
        assert_eq!(table.get_or_allocate("/a"), a);
        assert_eq!(table.path_of(a).as_deref(), Some("/a"));
    }

    #[test]
    fn test_unknown_inode() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(99), None);
    }
}
