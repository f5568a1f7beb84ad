//! Operation dispatch for the translation layer

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::debug;

use crate::attr::{self, FileStat};
use crate::dirlist::{DirEntry, DirLister};
use crate::error::{FsError, FsResult};
use crate::paths::PathMapper;
use crate::probe::LinkProber;
use crate::store::{BackingFile, BackingStore, DiskStore, FsStats, OpenOptions};

/// Identifier for an open backing file handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The symlink-emulating filesystem over a source tree.
///
/// All operations take mount-relative virtual paths. Link-aware operations
/// consult the prober on every call; everything else forwards to the
/// backing path, where link status is irrelevant.
pub struct NlinkFs {
    mapper: PathMapper,
    store: Arc<dyn BackingStore>,
    prober: LinkProber,
    lister: DirLister,
    handles: Mutex<HashMap<HandleId, Box<dyn BackingFile>>>,
    next_handle: AtomicU64,
}

impl NlinkFs {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self::with_store(source_root, Arc::new(DiskStore::new()))
    }

    pub fn with_store(source_root: impl Into<PathBuf>, store: Arc<dyn BackingStore>) -> Self {
        let mapper = PathMapper::new(source_root);
        let prober = LinkProber::new(mapper.clone(), Arc::clone(&store));
        let lister = DirLister::new(Arc::clone(&store));
        Self {
            mapper,
            store,
            prober,
            lister,
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn allocate_handle(&self, file: Box<dyn BackingFile>) -> HandleId {
        let id = HandleId::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.handles.lock().unwrap().insert(id, file);
        id
    }

    fn with_handle<T>(
        &self,
        handle: HandleId,
        f: impl FnOnce(&dyn BackingFile) -> FsResult<T>,
    ) -> FsResult<T> {
        let handles = self.handles.lock().unwrap();
        let file = handles.get(&handle).ok_or(FsError::BadHandle)?;
        f(file.as_ref())
    }

    // Link-aware operations.

    pub fn getattr(&self, path: &Path) -> FsResult<FileStat> {
        if let Some(target) = self.prober.probe(path)? {
            let stat = self.store.stat(&self.mapper.marker_path(path))?;
            return Ok(attr::link_attr(&stat, target.len() as u64));
        }
        self.store.stat(&self.mapper.backing_path(path))
    }

    pub fn readlink(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.prober.probe(path)?.ok_or(FsError::NotALink)
    }

    pub fn symlink(&self, path: &Path, target: &[u8]) -> FsResult<()> {
        debug!(
            "symlink {} -> {}",
            path.display(),
            String::from_utf8_lossy(target)
        );
        self.prober.create(path, target)
    }

    pub fn unlink(&self, path: &Path) -> FsResult<()> {
        debug!("unlink {}", path.display());
        if self.prober.probe(path)?.is_some() {
            return self.prober.remove(path);
        }
        self.store.unlink(&self.mapper.backing_path(path))
    }

    pub fn rename(&self, old: &Path, new: &Path) -> FsResult<()> {
        debug!("rename {} -> {}", old.display(), new.display());
        if self.prober.probe(old)?.is_some() {
            return self.prober.rename(old, new);
        }
        self.store
            .rename(&self.mapper.backing_path(old), &self.mapper.backing_path(new))
    }

    pub fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let target = if self.prober.probe(path)?.is_some() {
            self.mapper.marker_path(path)
        } else {
            self.mapper.backing_path(path)
        };
        self.store.chown(&target, uid, gid)
    }

    pub fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.lister.list(&self.mapper.backing_path(path))
    }

    // Passthrough operations.

    pub fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> FsResult<()> {
        let backing = self.mapper.backing_path(path);
        match (mode as libc::mode_t) & libc::S_IFMT {
            libc::S_IFREG => {
                self.store.create_exclusive(&backing, mode & 0o7777)?;
                Ok(())
            }
            libc::S_IFIFO => self.store.mkfifo(&backing, mode & 0o7777),
            _ => self.store.mknod(&backing, mode, rdev),
        }
    }

    pub fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.store.mkdir(&self.mapper.backing_path(path), mode)
    }

    pub fn rmdir(&self, path: &Path) -> FsResult<()> {
        self.store.rmdir(&self.mapper.backing_path(path))
    }

    pub fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        self.store.chmod(&self.mapper.backing_path(path), mode)
    }

    pub fn truncate(&self, path: &Path, size: u64) -> FsResult<()> {
        self.store.truncate(&self.mapper.backing_path(path), size)
    }

    pub fn set_times(
        &self,
        path: &Path,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        self.store
            .set_times(&self.mapper.backing_path(path), atime, mtime)
    }

    pub fn access(&self, path: &Path, mask: i32) -> FsResult<()> {
        self.store.access(&self.mapper.backing_path(path), mask)
    }

    pub fn statfs(&self, path: &Path) -> FsResult<FsStats> {
        self.store.statfs(&self.mapper.backing_path(path))
    }

    // Handle-based I/O.

    pub fn open(&self, path: &Path, opts: &OpenOptions) -> FsResult<HandleId> {
        let file = self.store.open(&self.mapper.backing_path(path), opts)?;
        Ok(self.allocate_handle(file))
    }

    pub fn create(&self, path: &Path, mode: u32, opts: &OpenOptions) -> FsResult<HandleId> {
        let file = self.store.create(&self.mapper.backing_path(path), mode, opts)?;
        Ok(self.allocate_handle(file))
    }

    pub fn read(&self, handle: HandleId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        self.with_handle(handle, |file| file.read_at(offset, buf))
    }

    pub fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.with_handle(handle, |file| file.write_at(offset, data))
    }

    pub fn fgetattr(&self, handle: HandleId) -> FsResult<FileStat> {
        self.with_handle(handle, |file| file.stat())
    }

    pub fn ftruncate(&self, handle: HandleId, size: u64) -> FsResult<()> {
        self.with_handle(handle, |file| file.truncate(size))
    }

    /// Called once per close of a descriptor; durability belongs to fsync,
    /// so this only validates the handle.
    pub fn flush(&self, handle: HandleId) -> FsResult<()> {
        self.with_handle(handle, |_file| Ok(()))
    }

    pub fn fsync(&self, handle: HandleId, datasync: bool) -> FsResult<()> {
        self.with_handle(handle, |file| file.sync(datasync))
    }

    pub fn release(&self, handle: HandleId) -> FsResult<()> {
        self.handles
            .lock()
            .unwrap()
            .remove(&handle)
            .map(|_| ())
            .ok_or(FsError::BadHandle)
    }
}
