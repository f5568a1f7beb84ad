//! NLINKFS Core — Symlink emulation over link-less backing filesystems
//!
//! This crate provides the marker codec, link prober, attribute faker, and
//! operation dispatcher for NLINKFS, with platform adapters providing the
//! glue. Symlinks are persisted as regular marker files (`<name>.LNK`)
//! holding a signature line and the link target, so a backing filesystem
//! that cannot store symlinks still round-trips them.

pub mod attr;
pub mod dirlist;
pub mod error;
pub mod marker;
pub mod paths;
pub mod probe;
pub mod store;
pub mod vfs;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export key types for convenience
pub use attr::{FileKind, FileStat};
pub use dirlist::{DirEntry, DirLister};
pub use error::{FsError, FsResult};
pub use paths::PathMapper;
pub use probe::LinkProber;
pub use store::{BackingFile, BackingStore, DiskStore, FsStats, OpenOptions, RawEntry};
pub use vfs::{HandleId, NlinkFs};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FsError::NotALink;
        assert_eq!(err.to_string(), "not a symlink");
    }

    #[test]
    fn test_marker_name_round_trip() {
        let name = std::ffi::OsStr::new("report");
        let marker = paths::attach_suffix(name);
        assert_eq!(marker, "report.LNK");
        assert_eq!(paths::strip_suffix(&marker).unwrap(), name);
    }
}
