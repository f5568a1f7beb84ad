//! Test doubles for the backing-store seam
//!
//! `FlakyStore` behaves like `DiskStore` except for paths registered to
//! fail, which lets tests exercise I/O failure handling the real
//! filesystem cannot produce on demand.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::attr::FileStat;
use crate::error::{FsError, FsResult};
use crate::store::{BackingFile, BackingStore, DiskStore, FsStats, OpenOptions, RawEntry};

fn eio() -> FsError {
    FsError::Io(io::Error::from_raw_os_error(libc::EIO))
}

pub(crate) struct FlakyStore {
    inner: DiskStore,
    fail_reads: Mutex<HashSet<PathBuf>>,
    fail_writes: Mutex<HashSet<PathBuf>>,
    inflated_stats: Mutex<HashSet<PathBuf>>,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: DiskStore::new(),
            fail_reads: Mutex::new(HashSet::new()),
            fail_writes: Mutex::new(HashSet::new()),
            inflated_stats: Mutex::new(HashSet::new()),
        }
    }

    /// Reads of `path` report EIO.
    pub(crate) fn fail_read(&self, path: PathBuf) {
        self.fail_reads.lock().unwrap().insert(path);
    }

    /// Files created at `path` refuse every write.
    pub(crate) fn fail_write(&self, path: PathBuf) {
        self.fail_writes.lock().unwrap().insert(path);
    }

    /// Stats of `path` report a size larger than the real content, so a
    /// full read comes back short.
    pub(crate) fn inflate_stat(&self, path: PathBuf) {
        self.inflated_stats.lock().unwrap().insert(path);
    }
}

impl BackingStore for FlakyStore {
    fn stat(&self, path: &Path) -> FsResult<FileStat> {
        let mut stat = self.inner.stat(path)?;
        if self.inflated_stats.lock().unwrap().contains(path) {
            stat.size += 16;
        }
        Ok(stat)
    }

    fn read_all(&self, path: &Path) -> FsResult<Vec<u8>> {
        if self.fail_reads.lock().unwrap().contains(path) {
            return Err(eio());
        }
        self.inner.read_all(path)
    }

    fn open(&self, path: &Path, opts: &OpenOptions) -> FsResult<Box<dyn BackingFile>> {
        self.inner.open(path, opts)
    }

    fn create(&self, path: &Path, mode: u32, opts: &OpenOptions) -> FsResult<Box<dyn BackingFile>> {
        self.inner.create(path, mode, opts)
    }

    fn create_exclusive(&self, path: &Path, mode: u32) -> FsResult<Box<dyn BackingFile>> {
        let file = self.inner.create_exclusive(path, mode)?;
        if self.fail_writes.lock().unwrap().contains(path) {
            return Ok(Box::new(BrokenFile));
        }
        Ok(file)
    }

    fn unlink(&self, path: &Path) -> FsResult<()> {
        self.inner.unlink(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.inner.rename(from, to)
    }

    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        self.inner.chown(path, uid, gid)
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.inner.chmod(path, mode)
    }

    fn truncate(&self, path: &Path, size: u64) -> FsResult<()> {
        self.inner.truncate(path, size)
    }

    fn set_times(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        self.inner.set_times(path, atime, mtime)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.inner.mkdir(path, mode)
    }

    fn rmdir(&self, path: &Path) -> FsResult<()> {
        self.inner.rmdir(path)
    }

    fn read_dir(&self, path: &Path) -> FsResult<Vec<RawEntry>> {
        self.inner.read_dir(path)
    }

    fn mkfifo(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.inner.mkfifo(path, mode)
    }

    fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> FsResult<()> {
        self.inner.mknod(path, mode, rdev)
    }

    fn access(&self, path: &Path, mask: i32) -> FsResult<()> {
        self.inner.access(path, mask)
    }

    fn statfs(&self, path: &Path) -> FsResult<FsStats> {
        self.inner.statfs(path)
    }
}

/// File that refuses every operation; stands in for a handle whose backing
/// device went away.
struct BrokenFile;

impl BackingFile for BrokenFile {
    fn stat(&self) -> FsResult<FileStat> {
        Err(eio())
    }

    fn read_at(&self, _offset: u64, _buf: &mut [u8]) -> FsResult<usize> {
        Err(eio())
    }

    fn write_at(&self, _offset: u64, _data: &[u8]) -> FsResult<usize> {
        Err(eio())
    }

    fn truncate(&self, _size: u64) -> FsResult<()> {
        Err(eio())
    }

    fn sync(&self, _data_only: bool) -> FsResult<()> {
        Err(eio())
    }
}
