//! Mount a composed stratafs tree through FUSE.
//!
//! The default composition mirrors the library's intended use: an in-memory
//! root, the host filesystem grafted at `/os/`, and (when configured) an S3
//! bucket at `/s3/`.

#[cfg(unix)]
mod error;
#[cfg(unix)]
mod fs;
#[cfg(unix)]
mod inode;

#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use std::sync::Arc;

#[cfg(unix)]
use clap::Parser;
#[cfg(unix)]
use serde::Deserialize;
#[cfg(unix)]
use stratafs::s3::{S3Config, S3Fs};
#[cfg(unix)]
use stratafs::{MemFs, MountFs, OsFs};
#[cfg(unix)]
use tokio_util::sync::CancellationToken;
#[cfg(unix)]
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
#[derive(Parser)]
#[clap(
    name = "stratafs-fuse",
    about = "Expose a composed stratafs mount table as a FUSE filesystem"
)]
struct Cli {
    /// Mount point directory (created if missing)
    #[clap(short, long, default_value = "/tmp/stratafs")]
    mount_point: PathBuf,

    /// TOML file configuring the backends to graft into the tree
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Re-anchor the /os/ mount below this host directory instead of /
    #[clap(long)]
    os_root: Option<PathBuf>,
}

/// Backend composition, read from the --config TOML file
#[cfg(unix)]
#[derive(Debug, Default, Deserialize)]
struct BridgeConfig {
    /// Host directory the /os/ mount is re-anchored below
    os_root: Option<PathBuf>,

    /// S3 connection settings; when present the bucket is mounted at /s3/
    s3: Option<S3Config>,
}

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stratafs=info,stratafs_fuse=info")),
        )
        .compact()
        .init();

    let args = Cli::parse();
    let mut config = match &args.config {
        Some(path) => toml::from_str::<BridgeConfig>(&std::fs::read_to_string(path)?)?,
        None => BridgeConfig::default(),
    };
    if args.os_root.is_some() {
        config.os_root = args.os_root.clone();
    }

    // the VFS side is async; FUSE callbacks bridge in via this runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let cancel = CancellationToken::new();

    let mount = Arc::new(MountFs::new(Arc::new(MemFs::new())));
    let os = match &config.os_root {
        Some(root) => OsFs::with_root(root.clone()),
        None => OsFs::new(),
    };
    mount.mount(Arc::new(os), "/os/")?;
    if let Some(s3_config) = config.s3 {
        let bucket = s3_config.bucket.clone();
        mount.mount(
            Arc::new(S3Fs::with_cancellation(s3_config, cancel.clone())?),
            "/s3/",
        )?;
        tracing::info!(bucket, "mounted S3 backend at /s3/");
    }

    std::fs::create_dir_all(&args.mount_point)?;
    let bridge = fs::VfsBridge::new(mount, runtime.handle().clone());

    tracing::info!(mount_point = %args.mount_point.display(), "mounting filesystem");
    let options = vec![
        fuser::MountOption::RO,
        fuser::MountOption::FSName("stratafs".to_string()),
        fuser::MountOption::AutoUnmount,
    ];
    fuser::mount2(bridge, &args.mount_point, &options)?;

    // the session ended; abort any HTTP the backends still have in flight
    cancel.cancel();
    Ok(())
}

#[cfg(not(unix))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("stratafs-fuse is only supported on Unix-like platforms");
}
