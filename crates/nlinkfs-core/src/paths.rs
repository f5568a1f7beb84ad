//! Virtual-to-backing path mapping

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Component, Path, PathBuf};

use crate::marker::MARKER_SUFFIX;

/// Maps mount-relative virtual paths onto the backing source tree.
///
/// The mapping is pure prefix substitution, recomputed on every call;
/// nothing is cached besides the source root itself.
#[derive(Clone, Debug)]
pub struct PathMapper {
    source_root: PathBuf,
}

impl PathMapper {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Backing path for a virtual path.
    ///
    /// Only normal components are honored; virtual paths arrive already
    /// resolved, so this cannot escape the source root.
    pub fn backing_path(&self, virtual_path: &Path) -> PathBuf {
        let mut out = self.source_root.clone();
        for comp in virtual_path.components() {
            if let Component::Normal(name) = comp {
                out.push(name);
            }
        }
        out
    }

    /// Marker path for a virtual path: the backing path with the marker
    /// suffix appended to the final component.
    pub fn marker_path(&self, virtual_path: &Path) -> PathBuf {
        let backing = self.backing_path(virtual_path);
        let mut bytes = backing.into_os_string().into_vec();
        bytes.extend_from_slice(MARKER_SUFFIX.as_bytes());
        PathBuf::from(OsString::from_vec(bytes))
    }
}

/// Append the marker suffix to a bare entry name.
pub fn attach_suffix(name: &OsStr) -> OsString {
    let mut bytes = name.as_bytes().to_vec();
    bytes.extend_from_slice(MARKER_SUFFIX.as_bytes());
    OsString::from_vec(bytes)
}

/// Strip the marker suffix from an entry name, if present.
///
/// A name that is nothing but the suffix does not strip; an empty virtual
/// name cannot exist.
pub fn strip_suffix(name: &OsStr) -> Option<&OsStr> {
    let bytes = name.as_bytes();
    let suffix = MARKER_SUFFIX.as_bytes();
    if bytes.len() > suffix.len() && bytes.ends_with(suffix) {
        Some(OsStr::from_bytes(&bytes[..bytes.len() - suffix.len()]))
    } else {
        None
    }
}
