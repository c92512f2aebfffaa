//! Host operating-system passthrough backend.
//!
//! A thin wrapper over `tokio::fs`. With a root configured, every VFS path is
//! re-anchored below it; without one, paths address the host filesystem
//! directly.

use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{VfsError, VfsResult};
use crate::fs::{File, Filesystem};
use crate::types::{FileInfo, OpenFlags};

/// OS passthrough filesystem
#[derive(Debug, Clone)]
pub struct OsFs {
    /// Root directory for this backend (optional constraint)
    root: Option<PathBuf>,
}

impl OsFs {
    /// Create a passthrough over the whole host filesystem
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Create a passthrough rooted at a specific directory
    ///
    /// All VFS paths are resolved relative to this root.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }
}

impl Default for OsFs {
    fn default() -> Self {
        Self::new()
    }
}

fn base_of(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

fn convert_metadata(name: &str, meta: &std::fs::Metadata) -> FileInfo {
    let mut info = if meta.is_dir() {
        FileInfo::directory(name)
    } else {
        FileInfo::file(name, meta.len())
    };
    if let Ok(modified) = meta.modified() {
        info = info.with_modified(modified);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        info = info.with_mode(meta.permissions().mode() & 0o7777);
    }
    info
}

#[async_trait]
impl Filesystem for OsFs {
    fn path_separator(&self) -> u8 {
        std::path::MAIN_SEPARATOR as u8
    }

    async fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<Box<dyn File>> {
        let resolved = self.resolve(path);
        let mut options = fs::OpenOptions::new();
        options
            .read(flags.contains(OpenFlags::READ))
            .write(flags.contains(OpenFlags::WRITE))
            .create(flags.contains(OpenFlags::CREATE))
            .truncate(flags.contains(OpenFlags::TRUNCATE))
            .append(flags.contains(OpenFlags::APPEND));
        #[cfg(unix)]
        if mode != 0 {
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        let file = options.open(&resolved).await.map_err(with_path(path))?;
        Ok(Box::new(OsFile {
            name: base_of(path).to_string(),
            file,
        }))
    }

    async fn remove(&self, path: &str) -> VfsResult<()> {
        let resolved = self.resolve(path);
        let meta = fs::metadata(&resolved).await.map_err(with_path(path))?;
        if meta.is_dir() {
            fs::remove_dir(&resolved).await.map_err(with_path(path))
        } else {
            fs::remove_file(&resolved).await.map_err(with_path(path))
        }
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        fs::rename(self.resolve(from), self.resolve(to))
            .await
            .map_err(with_path(from))
    }

    async fn mkdir(&self, path: &str, _mode: u32) -> VfsResult<()> {
        fs::create_dir(self.resolve(path))
            .await
            .map_err(with_path(path))
    }

    async fn stat(&self, path: &str) -> VfsResult<FileInfo> {
        let meta = fs::metadata(self.resolve(path))
            .await
            .map_err(with_path(path))?;
        Ok(convert_metadata(base_of(path), &meta))
    }

    async fn lstat(&self, path: &str) -> VfsResult<FileInfo> {
        let meta = fs::symlink_metadata(self.resolve(path))
            .await
            .map_err(with_path(path))?;
        Ok(convert_metadata(base_of(path), &meta))
    }

    async fn read_dir(&self, path: &str) -> VfsResult<Vec<FileInfo>> {
        let mut read_dir = fs::read_dir(self.resolve(path))
            .await
            .map_err(with_path(path))?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(with_path(path))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().await.map_err(with_path(path))?;
            entries.push(convert_metadata(&name, &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Fold an `io::Error` into a `VfsError`, filling in the path for not-found
/// and already-exists kinds.
fn with_path(path: &str) -> impl FnOnce(std::io::Error) -> VfsError + '_ {
    move |err| match VfsError::from(err) {
        VfsError::NotFound { .. } => VfsError::not_found(path),
        VfsError::AlreadyExists { .. } => VfsError::AlreadyExists {
            path: path.to_string(),
        },
        other => other,
    }
}

struct OsFile {
    name: String,
    file: fs::File,
}

#[async_trait]
impl File for OsFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self) -> VfsResult<FileInfo> {
        let meta = self.file.metadata().await.map_err(VfsError::from)?;
        Ok(convert_metadata(&self.name, &meta))
    }

    async fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        Ok(self.file.read(buf).await?)
    }

    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let saved = self.file.stream_position().await?;
        self.file.seek(SeekFrom::Start(offset)).await?;
        let n = self.file.read(buf).await?;
        self.file.seek(SeekFrom::Start(saved)).await?;
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        Ok(self.file.write(buf).await?)
    }

    async fn seek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        Ok(self.file.seek(pos).await?)
    }

    async fn truncate(&mut self, size: u64) -> VfsResult<()> {
        Ok(self.file.set_len(size).await?)
    }

    async fn sync(&mut self) -> VfsResult<()> {
        Ok(self.file.sync_all().await?)
    }

    async fn close(&mut self) -> VfsResult<()> {
        Ok(self.file.flush().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_roundtrip_under_root() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::with_root(dir.path());

        let mut f = fs
            .open_file("/hello.txt", OpenFlags::write_only(), 0o644)
            .await
            .unwrap();
        f.write(b"hello os").await.unwrap();
        f.close().await.unwrap();

        let info = fs.stat("/hello.txt").await.unwrap();
        assert_eq!(info.size, 8);
        assert_eq!(info.name, "hello.txt");
        assert!(!info.is_dir);

        let mut f = fs
            .open_file("/hello.txt", OpenFlags::read_only(), 0)
            .await
            .unwrap();
        let data = crate::fs::read_to_end(&mut *f).await.unwrap();
        assert_eq!(data, b"hello os");
    }

    #[tokio::test]
    async fn test_stat_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::with_root(dir.path());
        let err = fs.stat("/nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mkdir_read_dir_remove() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::with_root(dir.path());

        fs.mkdir("/sub", 0o755).await.unwrap();
        let mut f = fs
            .open_file("/sub/a", OpenFlags::write_only(), 0)
            .await
            .unwrap();
        f.write(b"1").await.unwrap();
        f.close().await.unwrap();

        let entries = fs.read_dir("/sub").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a");

        fs.remove("/sub/a").await.unwrap();
        fs.remove("/sub").await.unwrap();
        assert!(fs.stat("/sub").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_read_at_preserves_cursor() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::with_root(dir.path());

        let mut f = fs
            .open_file(
                "/data",
                OpenFlags::read_write() | OpenFlags::CREATE,
                0o644,
            )
            .await
            .unwrap();
        f.write(b"0123456789").await.unwrap();
        f.seek(SeekFrom::Start(1)).await.unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(f.read_at(&mut buf, 5).await.unwrap(), 2);
        assert_eq!(&buf, b"56");
        assert_eq!(f.seek(SeekFrom::Current(0)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rename() {
        let dir = TempDir::new().unwrap();
        let fs = OsFs::with_root(dir.path());
        let mut f = fs
            .open_file("/old", OpenFlags::write_only(), 0)
            .await
            .unwrap();
        f.write(b"x").await.unwrap();
        f.close().await.unwrap();

        fs.rename("/old", "/new").await.unwrap();
        assert!(fs.stat("/old").await.unwrap_err().is_not_found());
        assert_eq!(fs.stat("/new").await.unwrap().size, 1);
    }
}
