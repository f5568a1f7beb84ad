//! Backing store interface and the on-disk implementation
//!
//! The translation layer only ever sees this trait pair; production mounts
//! use [`DiskStore`], tests substitute doubles to exercise failure paths
//! the real filesystem cannot produce on demand.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use nix::fcntl;
use nix::sys::stat::{mknod, utimensat, Mode, SFlag, UtimensatFlags};
use nix::sys::statvfs::statvfs;
use nix::sys::time::TimeSpec;
use nix::unistd::{access, chown, mkfifo, truncate, AccessFlags, Gid, Uid};

use crate::attr::{FileKind, FileStat};
use crate::error::{FsError, FsResult};

/// Directory entry as enumerated from the backing store, in native order.
#[derive(Clone, Debug)]
pub struct RawEntry {
    pub name: OsString,
    pub kind: FileKind,
}

/// Filesystem-wide numbers reported by statfs.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsStats {
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub block_size: u32,
    pub fragment_size: u32,
    pub name_max: u32,
}

/// Options for opening a backing file.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub excl: bool,
}

impl OpenOptions {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn write_only() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Self::default()
        }
    }
}

/// An open file on the backing store.
pub trait BackingFile: Send + Sync {
    fn stat(&self) -> FsResult<FileStat>;
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<usize>;
    /// Writes the whole buffer; a short write surfaces as an I/O error.
    fn write_at(&self, offset: u64, data: &[u8]) -> FsResult<usize>;
    fn truncate(&self, size: u64) -> FsResult<()>;
    fn sync(&self, data_only: bool) -> FsResult<()>;
}

/// Filesystem surface consumed by the translation layer.
///
/// Every path argument is a backing path; virtual-path resolution happens
/// before calls reach this trait.
pub trait BackingStore: Send + Sync {
    fn stat(&self, path: &Path) -> FsResult<FileStat>;
    fn read_all(&self, path: &Path) -> FsResult<Vec<u8>>;
    fn open(&self, path: &Path, opts: &OpenOptions) -> FsResult<Box<dyn BackingFile>>;
    fn create(&self, path: &Path, mode: u32, opts: &OpenOptions) -> FsResult<Box<dyn BackingFile>>;
    fn create_exclusive(&self, path: &Path, mode: u32) -> FsResult<Box<dyn BackingFile>>;
    fn unlink(&self, path: &Path) -> FsResult<()>;
    fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;
    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> FsResult<()>;
    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()>;
    fn truncate(&self, path: &Path, size: u64) -> FsResult<()>;
    fn set_times(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()>;
    fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()>;
    fn rmdir(&self, path: &Path) -> FsResult<()>;
    fn read_dir(&self, path: &Path) -> FsResult<Vec<RawEntry>>;
    fn mkfifo(&self, path: &Path, mode: u32) -> FsResult<()>;
    fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> FsResult<()>;
    fn access(&self, path: &Path, mask: i32) -> FsResult<()>;
    fn statfs(&self, path: &Path) -> FsResult<FsStats>;
}

/// Backing store over a real directory tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskStore;

impl DiskStore {
    pub fn new() -> Self {
        Self
    }
}

fn nix_err(err: nix::errno::Errno) -> FsError {
    FsError::from_backing(io::Error::from_raw_os_error(err as i32))
}

fn time_spec(time: Option<SystemTime>) -> TimeSpec {
    match time {
        Some(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => TimeSpec::new(d.as_secs() as libc::time_t, d.subsec_nanos() as libc::c_long),
            Err(_) => TimeSpec::new(0, 0),
        },
        None => TimeSpec::UTIME_OMIT,
    }
}

impl BackingStore for DiskStore {
    fn stat(&self, path: &Path) -> FsResult<FileStat> {
        let meta = fs::symlink_metadata(path).map_err(FsError::from_backing)?;
        Ok(FileStat::from_metadata(&meta))
    }

    fn read_all(&self, path: &Path) -> FsResult<Vec<u8>> {
        fs::read(path).map_err(FsError::from_backing)
    }

    fn open(&self, path: &Path, opts: &OpenOptions) -> FsResult<Box<dyn BackingFile>> {
        let mut options = fs::OpenOptions::new();
        options
            .read(opts.read)
            .write(opts.write)
            .append(opts.append)
            .truncate(opts.truncate);
        let file = options.open(path).map_err(FsError::from_backing)?;
        Ok(Box::new(DiskFile { file }))
    }

    fn create(&self, path: &Path, mode: u32, opts: &OpenOptions) -> FsResult<Box<dyn BackingFile>> {
        let mut options = fs::OpenOptions::new();
        // O_CREAT needs a writable descriptor regardless of the caller's
        // access mode; the kernel enforces the caller's mode on its side.
        options.read(opts.read).write(true).mode(mode);
        if opts.excl {
            options.create_new(true);
        } else {
            options.create(true);
        }
        if opts.truncate {
            options.truncate(true);
        }
        let file = options.open(path).map_err(FsError::from_backing)?;
        Ok(Box::new(DiskFile { file }))
    }

    fn create_exclusive(&self, path: &Path, mode: u32) -> FsResult<Box<dyn BackingFile>> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)
            .map_err(FsError::from_backing)?;
        Ok(Box::new(DiskFile { file }))
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path).map_err(FsError::from_backing)
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        fs::rename(from, to).map_err(FsError::from_backing)
    }

    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        chown(path, uid.map(Uid::from_raw), gid.map(Gid::from_raw)).map_err(nix_err)
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(FsError::from_backing)
    }

    fn truncate(&self, path: &Path, size: u64) -> FsResult<()> {
        truncate(path, size as libc::off_t).map_err(nix_err)
    }

    fn set_times(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        utimensat(
            fcntl::AT_FDCWD,
            path,
            &time_spec(atime),
            &time_spec(mtime),
            UtimensatFlags::NoFollowSymlink,
        )
        .map_err(nix_err)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        fs::DirBuilder::new()
            .mode(mode)
            .create(path)
            .map_err(FsError::from_backing)
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        fs::remove_dir(path).map_err(FsError::from_backing)
    }

    fn read_dir(&self, path: &Path) -> FsResult<Vec<RawEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(FsError::from_backing)? {
            let entry = entry.map_err(FsError::from_backing)?;
            let kind = entry
                .file_type()
                .map(FileKind::from)
                .unwrap_or(FileKind::RegularFile);
            entries.push(RawEntry {
                name: entry.file_name(),
                kind,
            });
        }
        Ok(entries)
    }

    fn mkfifo(&self, path: &Path, mode: u32) -> FsResult<()> {
        mkfifo(path, Mode::from_bits_truncate(mode as libc::mode_t)).map_err(nix_err)
    }

    fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> FsResult<()> {
        mknod(
            path,
            SFlag::from_bits_truncate(mode as libc::mode_t),
            Mode::from_bits_truncate(mode as libc::mode_t),
            rdev as libc::dev_t,
        )
        .map_err(nix_err)
    }

    fn access(&self, path: &Path, mask: i32) -> FsResult<()> {
        access(path, AccessFlags::from_bits_truncate(mask as libc::c_int)).map_err(nix_err)
    }

    fn statfs(&self, path: &Path) -> FsResult<FsStats> {
        let vfs = statvfs(path).map_err(nix_err)?;
        Ok(FsStats {
            blocks: vfs.blocks() as u64,
            blocks_free: vfs.blocks_free() as u64,
            blocks_available: vfs.blocks_available() as u64,
            files: vfs.files() as u64,
            files_free: vfs.files_free() as u64,
            block_size: vfs.block_size() as u32,
            fragment_size: vfs.fragment_size() as u32,
            name_max: vfs.name_max() as u32,
        })
    }
}

struct DiskFile {
    file: File,
}

impl BackingFile for DiskFile {
    fn stat(&self) -> FsResult<FileStat> {
        let meta = self.file.metadata().map_err(FsError::from_backing)?;
        Ok(FileStat::from_metadata(&meta))
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        self.file.read_at(buf, offset).map_err(FsError::from_backing)
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.file
            .write_all_at(data, offset)
            .map_err(FsError::from_backing)?;
        Ok(data.len())
    }

    fn truncate(&self, size: u64) -> FsResult<()> {
        self.file.set_len(size).map_err(FsError::from_backing)
    }

    fn sync(&self, data_only: bool) -> FsResult<()> {
        if data_only {
            self.file.sync_data().map_err(FsError::from_backing)
        } else {
            self.file.sync_all().map_err(FsError::from_backing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store_in(dir: &Path) -> (DiskStore, std::path::PathBuf) {
        (DiskStore::new(), dir.to_path_buf())
    }

    #[test]
    fn test_stat_and_read_all() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let path = root.join("file.txt");
        fs::write(&path, b"content").unwrap();

        let stat = store.stat(&path).unwrap();
        assert_eq!(stat.kind, FileKind::RegularFile);
        assert_eq!(stat.size, 7);
        assert_eq!(store.read_all(&path).unwrap(), b"content");
    }

    #[test]
    fn test_stat_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        assert!(matches!(
            store.stat(&root.join("absent")),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn test_create_exclusive_refuses_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let path = root.join("once");

        store.create_exclusive(&path, 0o644).unwrap();
        assert!(matches!(
            store.create_exclusive(&path, 0o644),
            Err(FsError::AlreadyExists)
        ));
    }

    #[test]
    fn test_handle_write_read_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let path = root.join("data");

        let file = store.create_exclusive(&path, 0o644).unwrap();
        assert_eq!(file.write_at(0, b"hello world").unwrap(), 11);
        file.sync(false).unwrap();

        let file = store.open(&path, &OpenOptions::read_only()).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(file.read_at(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(file.stat().unwrap().size, 11);
    }

    #[test]
    fn test_rename_and_unlink() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let old = root.join("old");
        let new = root.join("new");
        fs::write(&old, b"x").unwrap();

        store.rename(&old, &new).unwrap();
        assert!(!old.exists());
        assert!(new.exists());

        store.unlink(&new).unwrap();
        assert!(!new.exists());
        assert!(matches!(store.unlink(&new), Err(FsError::NotFound)));
    }

    #[test]
    fn test_read_dir_names_and_kinds() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        fs::write(root.join("plain"), b"").unwrap();
        fs::create_dir(root.join("sub")).unwrap();

        let entries = store.read_dir(&root).unwrap();
        assert_eq!(entries.len(), 2);
        let kind_of = |name: &str| {
            entries
                .iter()
                .find(|e| e.name == OsString::from(name))
                .map(|e| e.kind)
        };
        assert_eq!(kind_of("plain"), Some(FileKind::RegularFile));
        assert_eq!(kind_of("sub"), Some(FileKind::Directory));
    }

    #[test]
    fn test_mkdir_rmdir() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let dir = root.join("made");

        store.mkdir(&dir, 0o755).unwrap();
        assert!(store.stat(&dir).unwrap().kind == FileKind::Directory);
        store.rmdir(&dir).unwrap();
        assert!(matches!(store.stat(&dir), Err(FsError::NotFound)));
    }

    #[test]
    fn test_chmod_changes_perm() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let path = root.join("file");
        fs::write(&path, b"").unwrap();

        store.chmod(&path, 0o600).unwrap();
        assert_eq!(store.stat(&path).unwrap().perm, 0o600);
    }

    #[test]
    fn test_truncate_path() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let path = root.join("file");
        fs::write(&path, b"0123456789").unwrap();

        store.truncate(&path, 4).unwrap();
        assert_eq!(store.read_all(&path).unwrap(), b"0123");
    }

    #[test]
    fn test_set_times_updates_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let path = root.join("file");
        fs::write(&path, b"").unwrap();

        let stamp = UNIX_EPOCH + Duration::from_secs(1_000_000);
        store.set_times(&path, None, Some(stamp)).unwrap();
        assert_eq!(store.stat(&path).unwrap().mtime, stamp);
    }

    #[test]
    fn test_mkfifo_creates_fifo() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let path = root.join("pipe");

        store.mkfifo(&path, 0o644).unwrap();
        assert_eq!(store.stat(&path).unwrap().kind, FileKind::Fifo);
    }

    #[test]
    fn test_access() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let path = root.join("file");
        fs::write(&path, b"").unwrap();

        store.access(&path, libc::R_OK).unwrap();
        assert!(matches!(
            store.access(&root.join("absent"), libc::F_OK),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn test_statfs_reports_block_size() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, root) = store_in(tmp.path());
        let stats = store.statfs(&root).unwrap();
        assert!(stats.block_size > 0);
    }
}
