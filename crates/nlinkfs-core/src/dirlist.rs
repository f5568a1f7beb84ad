//! Directory listing translation
//!
//! Valid marker files collapse to their emulated-link names; the raw
//! `.LNK` entry is never shown for them. Suffixed files that are not
//! markers keep their literal names, so foreign `.LNK` files coexist with
//! emulated links.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use crate::attr::FileKind;
use crate::error::FsResult;
use crate::marker;
use crate::paths;
use crate::store::{BackingStore, RawEntry};

/// Directory entry in the virtual view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: FileKind,
}

pub struct DirLister {
    store: Arc<dyn BackingStore>,
}

impl DirLister {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self { store }
    }

    /// Expand a backing directory into the virtual view, preserving the
    /// store's native enumeration order.
    ///
    /// Classification reads each `.LNK` candidate directly; a candidate
    /// that cannot be read or decoded passes through under its raw name,
    /// so one corrupt file never breaks directory browsing.
    pub fn list(&self, backing_dir: &Path) -> FsResult<Vec<DirEntry>> {
        let raw = self.store.read_dir(backing_dir)?;
        let mut entries = Vec::with_capacity(raw.len());
        for entry in raw {
            match self.emulated_name(backing_dir, &entry) {
                Some(stripped) => entries.push(DirEntry {
                    name: stripped,
                    kind: FileKind::Symlink,
                }),
                None => entries.push(DirEntry {
                    name: entry.name,
                    kind: entry.kind,
                }),
            }
        }
        Ok(entries)
    }

    fn emulated_name(&self, backing_dir: &Path, entry: &RawEntry) -> Option<OsString> {
        if entry.kind != FileKind::RegularFile {
            return None;
        }
        let stripped = paths::strip_suffix(&entry.name)?;
        let bytes = self.store.read_all(&backing_dir.join(&entry.name)).ok()?;
        marker::decode(&bytes)?;
        Some(stripped.to_os_string())
    }
}
