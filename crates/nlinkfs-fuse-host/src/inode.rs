//! Inode-to-path bookkeeping for the FUSE adapter
//!
//! The core works on mount-relative paths; the kernel speaks inode
//! numbers. This table owns the mapping in both directions. Numbers are
//! never reused within a mount session.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub const ROOT_INODE: u64 = 1;

pub struct InodeTable {
    paths: HashMap<u64, PathBuf>,
    inodes: HashMap<PathBuf, u64>,
    next_inode: u64,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            paths: HashMap::new(),
            inodes: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        table.paths.insert(ROOT_INODE, PathBuf::from("/"));
        table.inodes.insert(PathBuf::from("/"), ROOT_INODE);
        table
    }

    pub fn path(&self, ino: u64) -> Option<&Path> {
        self.paths.get(&ino).map(|p| p.as_path())
    }

    pub fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path(parent).map(|dir| dir.join(name))
    }

    pub fn get_or_insert(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.paths.insert(ino, path.to_path_buf());
        self.inodes.insert(path.to_path_buf(), ino);
        ino
    }

    pub fn forget_path(&mut self, path: &Path) {
        if let Some(ino) = self.inodes.remove(path) {
            self.paths.remove(&ino);
        }
    }

    /// Rewrites every mapping at or below `old` to live below `new`.
    /// Inode numbers survive the move; a mapping already present at a
    /// destination path was overwritten by the rename and is dropped.
    pub fn rename_path(&mut self, old: &Path, new: &Path) {
        let moved: Vec<(PathBuf, u64, PathBuf)> = self
            .inodes
            .iter()
            .filter_map(|(path, &ino)| {
                let suffix = path.strip_prefix(old).ok()?;
                let dest = if suffix.as_os_str().is_empty() {
                    new.to_path_buf()
                } else {
                    new.join(suffix)
                };
                Some((path.clone(), ino, dest))
            })
            .collect();

        for (old_path, ino, dest) in moved {
            self.inodes.remove(&old_path);
            if let Some(stale) = self.inodes.remove(&dest) {
                self.paths.remove(&stale);
            }
            self.inodes.insert(dest.clone(), ino);
            self.paths.insert(ino, dest);
        }
    }
}
