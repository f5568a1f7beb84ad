//! Per-path link detection and marker lifecycle
//!
//! A virtual path denotes an emulated symlink iff a regular file with valid
//! marker content sits at its marker path. There is no registry of links;
//! every probe re-reads the backing store, so external modification of the
//! source tree is picked up immediately.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::attr::FileKind;
use crate::error::{FsError, FsResult};
use crate::marker;
use crate::paths::PathMapper;
use crate::store::BackingStore;

/// Mode bits for freshly created marker files.
const MARKER_MODE: u32 = 0o777;

pub struct LinkProber {
    mapper: PathMapper,
    store: Arc<dyn BackingStore>,
}

impl LinkProber {
    pub fn new(mapper: PathMapper, store: Arc<dyn BackingStore>) -> Self {
        Self { mapper, store }
    }

    /// Decode the link target for `virtual_path`, or `None` when the path
    /// is not an emulated link.
    ///
    /// A failed stat of the marker path is authoritative: no marker, not a
    /// link. A read that yields fewer bytes than the stat-reported size is
    /// an I/O failure and propagates as one; treating it as "not a link"
    /// would let marker innards show through as ordinary file content.
    pub fn probe(&self, virtual_path: &Path) -> FsResult<Option<Vec<u8>>> {
        let marker_path = self.mapper.marker_path(virtual_path);
        let stat = match self.store.stat(&marker_path) {
            Ok(stat) => stat,
            Err(_) => return Ok(None),
        };
        if stat.kind != FileKind::RegularFile {
            return Ok(None);
        }
        let bytes = self.store.read_all(&marker_path)?;
        if (bytes.len() as u64) < stat.size {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read on marker {}", marker_path.display()),
            )));
        }
        Ok(marker::decode(&bytes).map(|target| target.to_vec()))
    }

    /// Create the marker for a new emulated link.
    ///
    /// Creation is exclusive, matching symlink() semantics: an existing
    /// file at the marker path fails the call. A failed content write must
    /// not leave a partial marker behind, so the freshly created file is
    /// unlinked before the error propagates.
    pub fn create(&self, virtual_path: &Path, target: &[u8]) -> FsResult<()> {
        let marker_path = self.mapper.marker_path(virtual_path);
        let file = self.store.create_exclusive(&marker_path, MARKER_MODE)?;
        if let Err(err) = file.write_at(0, &marker::encode(target)) {
            drop(file);
            if let Err(cleanup_err) = self.store.unlink(&marker_path) {
                warn!(
                    "failed to remove partial marker {}: {}",
                    marker_path.display(),
                    cleanup_err
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Delete the marker for an emulated link.
    pub fn remove(&self, virtual_path: &Path) -> FsResult<()> {
        self.store.unlink(&self.mapper.marker_path(virtual_path))
    }

    /// Move a marker to a new virtual name, target content unchanged.
    pub fn rename(&self, virtual_path: &Path, new_virtual_path: &Path) -> FsResult<()> {
        self.store.rename(
            &self.mapper.marker_path(virtual_path),
            &self.mapper.marker_path(new_virtual_path),
        )
    }
}
