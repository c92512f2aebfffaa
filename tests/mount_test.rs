//! Integration tests for the mount router: resolution, stripping, synthetic
//! listings and cross-mount policy.

use std::sync::Arc;

use stratafs::{read_to_end, Filesystem, MemFs, MountFs, OpenFlags, OsFs, VfsError};
use tempfile::TempDir;

async fn write_file(fs: &dyn Filesystem, path: &str, data: &[u8]) {
    let mut f = fs
        .open_file(path, OpenFlags::write_only(), 0o644)
        .await
        .unwrap();
    f.write(data).await.unwrap();
    f.close().await.unwrap();
}

#[tokio::test]
async fn test_mount_listing_shows_junctions() {
    let mount = MountFs::new(Arc::new(MemFs::new()));
    mount.mount(Arc::new(MemFs::new()), "/m/").unwrap();

    let dir = TempDir::new().unwrap();
    mount
        .mount(Arc::new(OsFs::with_root(dir.path())), "/o/")
        .unwrap();

    let mut names: Vec<String> = mount
        .read_dir("/")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["m", "o"]);

    let entries = mount.read_dir("/").await.unwrap();
    assert!(entries.iter().all(|e| e.is_dir));
}

#[tokio::test]
async fn test_delegation_strips_prefix() {
    let inner = Arc::new(MemFs::new());
    let mount = MountFs::new(Arc::new(MemFs::new()));
    mount.mount(inner.clone(), "/m/").unwrap();

    // visible through the router under the prefix...
    write_file(&mount, "/m/x", b"payload").await;
    let info = mount.stat("/m/x").await.unwrap();
    assert_eq!(info.size, 7);
    assert_eq!(info.name, "x");

    // ...and stored in the backend under the stripped path
    let info = inner.stat("/x").await.unwrap();
    assert_eq!(info.size, 7);

    assert!(mount.stat("/m/y").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_longest_prefix_wins() {
    let shallow = Arc::new(MemFs::new());
    let deep = Arc::new(MemFs::new());
    let mount = MountFs::new(Arc::new(MemFs::new()));
    mount.mount(shallow.clone(), "/a/").unwrap();
    mount.mount(deep.clone(), "/a/b/").unwrap();

    write_file(&mount, "/a/b/c.txt", b"deep").await;
    write_file(&mount, "/a/x.txt", b"shallow!").await;

    assert_eq!(deep.stat("/c.txt").await.unwrap().size, 4);
    assert!(shallow.stat("/b/c.txt").await.unwrap_err().is_not_found());
    assert_eq!(shallow.stat("/x.txt").await.unwrap().size, 8);
}

#[tokio::test]
async fn test_mount_point_stat_is_backend_root() {
    let mount = MountFs::new(Arc::new(MemFs::new()));
    mount.mount(Arc::new(MemFs::new()), "/m/").unwrap();

    let info = mount.stat("/m").await.unwrap();
    assert!(info.is_dir);
}

#[tokio::test]
async fn test_real_entry_wins_over_synthetic() {
    let root = Arc::new(MemFs::new());
    let mount = MountFs::new(root.clone());
    root.mkdir("/m", 0).await.unwrap();
    mount.mount(Arc::new(MemFs::new()), "/m/").unwrap();

    let entries = mount.read_dir("/").await.unwrap();
    let m_entries: Vec<_> = entries.iter().filter(|e| e.name == "m").collect();
    assert_eq!(m_entries.len(), 1);
}

#[tokio::test]
async fn test_junction_only_directory_listing() {
    let mount = MountFs::new(Arc::new(MemFs::new()));
    mount.mount(Arc::new(MemFs::new()), "/x/y/").unwrap();

    // /x does not exist on the root backend, but the junction below it does
    let names: Vec<String> = mount
        .read_dir("/x")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["y"]);

    // listing an unrelated missing directory still fails
    assert!(mount.read_dir("/zzz").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_cross_mount_rename_fails() {
    let mount = MountFs::new(Arc::new(MemFs::new()));
    mount.mount(Arc::new(MemFs::new()), "/a/").unwrap();
    mount.mount(Arc::new(MemFs::new()), "/b/").unwrap();

    write_file(&mount, "/a/f", b"x").await;
    let err = mount.rename("/a/f", "/b/f").await.unwrap_err();
    assert!(matches!(err, VfsError::CrossMount { .. }));

    // within one mount, rename is delegated
    mount.rename("/a/f", "/a/g").await.unwrap();
    assert_eq!(mount.stat("/a/g").await.unwrap().size, 1);
}

#[tokio::test]
async fn test_paths_are_normalized_before_resolution() {
    let mount = MountFs::new(Arc::new(MemFs::new()));
    mount.mount(Arc::new(MemFs::new()), "m").unwrap();

    write_file(&mount, "/m/x", b"abc").await;
    assert_eq!(mount.stat("//m///x").await.unwrap().size, 3);
}

#[tokio::test]
async fn test_roundtrip_through_os_mount() {
    let dir = TempDir::new().unwrap();
    let mount = MountFs::new(Arc::new(MemFs::new()));
    mount
        .mount(Arc::new(OsFs::with_root(dir.path())), "/o/")
        .unwrap();

    write_file(&mount, "/o/data.bin", b"on disk").await;
    assert!(dir.path().join("data.bin").exists());

    let mut f = mount
        .open_file("/o/data.bin", OpenFlags::read_only(), 0)
        .await
        .unwrap();
    assert_eq!(read_to_end(&mut *f).await.unwrap(), b"on disk");

    let names: Vec<String> = mount
        .read_dir("/o")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["data.bin"]);
}

#[tokio::test]
async fn test_root_mount_receives_unmatched_paths() {
    let root = Arc::new(MemFs::new());
    let mount = MountFs::new(root.clone());
    mount.mount(Arc::new(MemFs::new()), "/m/").unwrap();

    write_file(&mount, "/plain.txt", b"root").await;
    assert_eq!(root.stat("/plain.txt").await.unwrap().size, 4);
}
