//! Attribute types and the emulated-link attribute transform

use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// File kind as reported through the mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    RegularFile,
    Directory,
    Symlink,
    Fifo,
    CharDevice,
    BlockDevice,
    Socket,
}

impl From<std::fs::FileType> for FileKind {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            FileKind::Directory
        } else if ft.is_symlink() {
            FileKind::Symlink
        } else if ft.is_fifo() {
            FileKind::Fifo
        } else if ft.is_char_device() {
            FileKind::CharDevice
        } else if ft.is_block_device() {
            FileKind::BlockDevice
        } else if ft.is_socket() {
            FileKind::Socket
        } else {
            FileKind::RegularFile
        }
    }
}

/// Stat data for a backing node, in mount-neutral form.
#[derive(Clone, Debug)]
pub struct FileStat {
    pub kind: FileKind,
    pub size: u64,
    pub blocks: u64,
    pub perm: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub blksize: u32,
}

impl FileStat {
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            kind: FileKind::from(meta.file_type()),
            size: meta.size(),
            blocks: meta.blocks(),
            perm: meta.mode() & 0o7777,
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            atime: epoch_time(meta.atime(), meta.atime_nsec()),
            mtime: epoch_time(meta.mtime(), meta.mtime_nsec()),
            ctime: epoch_time(meta.ctime(), meta.ctime_nsec()),
            blksize: meta.blksize() as u32,
        }
    }
}

fn epoch_time(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Permission bits reported for emulated links.
///
/// POSIX consumers ignore symlink permissions, so they are forced fully
/// open; the same bits must come back from every attribute surface.
pub const LINK_PERM: u32 = 0o777;

/// Attributes reported for an emulated link.
///
/// Starts from the marker file's real stat (ownership and timestamps
/// survive), forces the kind to symlink, widens the permission bits, and
/// reports the target's byte length instead of the marker's physical size.
pub fn link_attr(marker_stat: &FileStat, target_len: u64) -> FileStat {
    let mut attr = marker_stat.clone();
    attr.kind = FileKind::Symlink;
    attr.perm = LINK_PERM;
    attr.size = target_len;
    attr
}
