//! In-memory filesystem backend.
//!
//! A trivial map of nodes, useful as a mount-table root and in tests. Open
//! handles keep their node alive, so a file removed while open stays readable
//! through the existing handle until it is closed.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{VfsError, VfsResult};
use crate::fs::{File, Filesystem};
use crate::types::{FileInfo, OpenFlags};

/// In-memory filesystem
///
/// Cloning is cheap and shares the underlying node map.
#[derive(Clone)]
pub struct MemFs {
    nodes: Arc<RwLock<HashMap<String, Node>>>,
}

#[derive(Clone)]
enum Node {
    Dir { mode: u32 },
    File(Arc<RwLock<FileNode>>),
}

struct FileNode {
    data: Vec<u8>,
    mode: u32,
    modified: SystemTime,
}

fn normalize(path: &str) -> String {
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

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "/",
    }
}

fn base_of(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

impl MemFs {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::Dir { mode: 0o755 });
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Filesystem for MemFs {
    async fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<Box<dyn File>> {
        let path = normalize(path);
        let mut nodes = self.nodes.write().unwrap();
        let node = match nodes.get(&path) {
            Some(Node::Dir { .. }) => {
                return Err(VfsError::Io(format!("{path} is a directory")));
            }
            Some(Node::File(node)) => {
                if flags.contains(OpenFlags::WRITE) && flags.contains(OpenFlags::TRUNCATE) {
                    let mut file = node.write().unwrap();
                    file.data.clear();
                    file.modified = SystemTime::now();
                }
                node.clone()
            }
            None => {
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(VfsError::not_found(&path));
                }
                let parent = parent_of(&path);
                match nodes.get(parent) {
                    Some(Node::Dir { .. }) => {}
                    _ => return Err(VfsError::not_found(parent)),
                }
                let node = Arc::new(RwLock::new(FileNode {
                    data: Vec::new(),
                    mode: if mode == 0 { 0o644 } else { mode },
                    modified: SystemTime::now(),
                }));
                nodes.insert(path.clone(), Node::File(node.clone()));
                node
            }
        };
        Ok(Box::new(MemFile {
            name: base_of(&path).to_string(),
            node,
            pos: 0,
            flags,
        }))
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let path = normalize(path);
        if path == "/" {
            return Err(VfsError::Io("cannot remove root directory".into()));
        }
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get(&path) {
            None => return Err(VfsError::not_found(&path)),
            Some(Node::Dir { .. }) => {
                let has_children = nodes.keys().any(|k| parent_of(k) == path && k != "/");
                if has_children {
                    return Err(VfsError::Io(format!("directory not empty: {path}")));
                }
            }
            Some(Node::File(_)) => {}
        }
        nodes.remove(&path);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut nodes = self.nodes.write().unwrap();
        let node = nodes.remove(&from).ok_or_else(|| VfsError::not_found(&from))?;
        if matches!(node, Node::Dir { .. }) {
            // move the subtree along with the directory itself
            let prefix = format!("{from}/");
            let children: Vec<String> = nodes
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in children {
                if let Some(child) = nodes.remove(&key) {
                    let moved = format!("{to}{}", &key[from.len()..]);
                    nodes.insert(moved, child);
                }
            }
        }
        nodes.insert(to, node);
        Ok(())
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.write().unwrap();
        if nodes.contains_key(&path) {
            return Err(VfsError::AlreadyExists { path });
        }
        let parent = parent_of(&path);
        match nodes.get(parent) {
            Some(Node::Dir { .. }) => {}
            _ => return Err(VfsError::not_found(parent)),
        }
        nodes.insert(
            path,
            Node::Dir {
                mode: if mode == 0 { 0o755 } else { mode },
            },
        );
        Ok(())
    }

    async fn stat(&self, path: &str) -> VfsResult<FileInfo> {
        let path = normalize(path);
        let nodes = self.nodes.read().unwrap();
        match nodes.get(&path) {
            None => Err(VfsError::not_found(&path)),
            Some(Node::Dir { mode }) => {
                Ok(FileInfo::directory(base_of(&path)).with_mode(*mode))
            }
            Some(Node::File(node)) => {
                let file = node.read().unwrap();
                Ok(FileInfo::file(base_of(&path), file.data.len() as u64)
                    .with_mode(file.mode)
                    .with_modified(file.modified))
            }
        }
    }

    async fn lstat(&self, path: &str) -> VfsResult<FileInfo> {
        self.stat(path).await
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<FileInfo>> {
        let path = normalize(path);
        let nodes = self.nodes.read().unwrap();
        match nodes.get(&path) {
            None => return Err(VfsError::not_found(&path)),
            Some(Node::File(_)) => {
                return Err(VfsError::Io(format!("{path} is not a directory")));
            }
            Some(Node::Dir { .. }) => {}
        }
        let mut entries = Vec::new();
        for (key, node) in nodes.iter() {
            if key == "/" || parent_of(key) != path {
                continue;
            }
            entries.push(match node {
                Node::Dir { mode } => FileInfo::directory(base_of(key)).with_mode(*mode),
                Node::File(node) => {
                    let file = node.read().unwrap();
                    FileInfo::file(base_of(key), file.data.len() as u64)
                        .with_mode(file.mode)
                        .with_modified(file.modified)
                }
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

struct MemFile {
    name: String,
    node: Arc<RwLock<FileNode>>,
    pos: u64,
    flags: OpenFlags,
}

#[async_trait]
impl File for MemFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        let file = self.node.read().unwrap();
        Ok(FileInfo::file(&self.name, file.data.len() as u64)
            .with_mode(file.mode)
            .with_modified(file.modified))
    }

    async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(VfsError::Io("file not opened for reading".into()));
        }
        let file = self.node.read().unwrap();
        let pos = self.pos as usize;
        let n = buf.len().min(file.data.len().saturating_sub(pos));
        buf[..n].copy_from_slice(&file.data[pos..pos + n]);
        self.pos += n as u64;
        Ok(n)
    }

    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(VfsError::Io("file not opened for reading".into()));
        }
        let file = self.node.read().unwrap();
        let pos = offset as usize;
        let n = buf.len().min(file.data.len().saturating_sub(pos));
        buf[..n].copy_from_slice(&file.data[pos..pos + n]);
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(VfsError::Io("file not opened for writing".into()));
        }
        let mut file = self.node.write().unwrap();
        let at = if self.flags.contains(OpenFlags::APPEND) {
            file.data.len()
        } else {
            self.pos as usize
        };
        let end = at + buf.len();
        if file.data.len() < end {
            file.data.resize(end, 0);
        }
        file.data[at..end].copy_from_slice(buf);
        file.modified = SystemTime::now();
        self.pos = end as u64;
        Ok(buf.len())
    }

    async fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        let len = self.node.read().unwrap().data.len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => len + n,
            SeekFrom::Current(n) => self.pos as i64 + n,
        };
        if target < 0 {
            return Err(VfsError::Io("seek before start of file".into()));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    async fn truncate(&mut self, size: u64) -> VfsResult<()> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(VfsError::Io("file not opened for writing".into()));
        }
        let mut file = self.node.write().unwrap();
        file.data.resize(size as usize, 0);
        file.modified = SystemTime::now();
        Ok(())
    }

    async fn sync(&mut self) -> VfsResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> VfsResult<()> {
        Ok(())
    }
}
