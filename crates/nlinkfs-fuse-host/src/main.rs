//! NLINKFS FUSE Host — Linux/macOS symlink emulation mount
//!
//! This binary mounts a source directory through FUSE and presents the
//! `<name>.LNK` marker files inside it as real symbolic links, for backing
//! filesystems that cannot store symlinks themselves.

#[cfg(feature = "fuse")]
mod adapter;
#[cfg(feature = "fuse")]
mod inode;

#[cfg(feature = "fuse")]
use adapter::NlinkFuse;
use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
#[cfg(feature = "fuse")]
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
struct Args {
    /// Source directory that physically stores the tree
    source_dir: PathBuf,

    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,

    /// Mount read-only
    #[arg(long)]
    read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MountConfig {
    fs_name: String,
    attr_ttl_ms: u64,
    entry_ttl_ms: u64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_name: "nlinkfs".to_string(),
            attr_ttl_ms: 1000,
            entry_ttl_ms: 1000,
        }
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<MountConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            let config: MountConfig = serde_json::from_str(&content)?;
            Ok(config)
        }
        None => {
            // Default configuration
            Ok(MountConfig::default())
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Starting NLINKFS FUSE Host");
    info!("Source directory: {}", args.source_dir.display());
    info!("Mount point: {}", args.mount_point.display());

    let config = load_config(args.config)?;
    info!("Configuration loaded: {:?}", config);

    let source_dir = fs::canonicalize(&args.source_dir)?;

    #[cfg(feature = "fuse")]
    {
        let filesystem = NlinkFuse::new(
            source_dir,
            Duration::from_millis(config.attr_ttl_ms),
            Duration::from_millis(config.entry_ttl_ms),
        );

        let mut mount_options = vec![
            fuser::MountOption::FSName(config.fs_name.clone()),
            fuser::MountOption::Subtype("nlinkfs".to_string()),
        ];

        if args.allow_other {
            mount_options.push(fuser::MountOption::AllowOther);
        }

        if args.allow_root {
            mount_options.push(fuser::MountOption::AllowRoot);
        }

        if args.auto_unmount {
            mount_options.push(fuser::MountOption::AutoUnmount);
        }

        if args.read_only {
            mount_options.push(fuser::MountOption::RO);
        }

        info!("Mounting filesystem...");
        fuser::mount2(filesystem, &args.mount_point, &mount_options)?;
    }

    #[cfg(not(feature = "fuse"))]
    {
        warn!("FUSE support not compiled in. This binary is for testing only.");
        info!("Source tree at {} validated", source_dir.display());
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}
