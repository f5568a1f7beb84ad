//! NLINKFS FUSE adapter implementation
//!
//! Maps FUSE operations to NLINKFS core calls. The kernel addresses nodes
//! by inode number; this layer resolves numbers to mount-relative paths
//! and hands them to the core, which decides per call whether a name is
//! an emulated link or plain passthrough.

#[cfg(not(feature = "fuse"))]
compile_error!("This module requires the 'fuse' feature to be enabled");

use fuser::{
    FileAttr, FileType, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use nlinkfs_core::{FileKind, FileStat, FsError, HandleId, NlinkFs, OpenOptions};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::info;

use crate::inode::InodeTable;

/// NLINKFS FUSE filesystem adapter
pub struct NlinkFuse {
    fs: NlinkFs,
    inodes: InodeTable,
    attr_ttl: Duration,
    entry_ttl: Duration,
}

impl NlinkFuse {
    pub fn new(source_root: impl Into<PathBuf>, attr_ttl: Duration, entry_ttl: Duration) -> Self {
        Self {
            fs: NlinkFs::new(source_root),
            inodes: InodeTable::new(),
            attr_ttl,
            entry_ttl,
        }
    }

    /// Resolve an inode to an owned path; callers need `&mut self` back
    /// for the inode table afterwards.
    fn path_of(&self, ino: u64) -> Option<PathBuf> {
        self.inodes.path(ino).map(Path::to_path_buf)
    }
}

fn errno(err: &FsError) -> c_int {
    match err {
        FsError::NotFound => libc::ENOENT,
        FsError::NotALink => libc::EINVAL,
        FsError::AlreadyExists => libc::EEXIST,
        FsError::AccessDenied => libc::EACCES,
        FsError::InvalidArgument => libc::EINVAL,
        FsError::NotADirectory => libc::ENOTDIR,
        FsError::IsADirectory => libc::EISDIR,
        FsError::NotEmpty => libc::ENOTEMPTY,
        FsError::BadHandle => libc::EBADF,
        FsError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        FsError::Unsupported => libc::ENOSYS,
    }
}

fn fuse_kind(kind: FileKind) -> FileType {
    match kind {
        FileKind::RegularFile => FileType::RegularFile,
        FileKind::Directory => FileType::Directory,
        FileKind::Symlink => FileType::Symlink,
        FileKind::Fifo => FileType::NamedPipe,
        FileKind::CharDevice => FileType::CharDevice,
        FileKind::BlockDevice => FileType::BlockDevice,
        FileKind::Socket => FileType::Socket,
    }
}

fn fuse_attr(ino: u64, stat: &FileStat) -> FileAttr {
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.blocks,
        atime: stat.atime,
        mtime: stat.mtime,
        ctime: stat.ctime,
        crtime: stat.ctime,
        kind: fuse_kind(stat.kind),
        perm: stat.perm as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: stat.rdev as u32,
        blksize: stat.blksize,
        flags: 0,
    }
}

fn open_options(flags: i32) -> OpenOptions {
    let mut opts = match flags & libc::O_ACCMODE {
        libc::O_WRONLY => OpenOptions::write_only(),
        libc::O_RDWR => OpenOptions::read_write(),
        _ => OpenOptions::read_only(),
    };
    opts.append = flags & libc::O_APPEND != 0;
    opts.truncate = flags & libc::O_TRUNC != 0;
    opts.excl = flags & libc::O_EXCL != 0;
    opts
}

fn system_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

impl fuser::Filesystem for NlinkFuse {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!("NLINKFS FUSE adapter initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("NLINKFS FUSE adapter destroyed");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.inodes.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.getattr(&path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_insert(&path);
                reply.entry(&self.entry_ttl, &fuse_attr(ino, &stat), 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        if let Some(fh) = fh {
            match self.fs.fgetattr(HandleId::new(fh)) {
                Ok(stat) => reply.attr(&self.attr_ttl, &fuse_attr(ino, &stat)),
                Err(err) => reply.error(errno(&err)),
            }
            return;
        }

        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.getattr(&path) {
            Ok(stat) => reply.attr(&self.attr_ttl, &fuse_attr(ino, &stat)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        if let Some(mode) = mode {
            if let Err(err) = self.fs.chmod(&path, mode & 0o7777) {
                reply.error(errno(&err));
                return;
            }
        }

        if uid.is_some() || gid.is_some() {
            if let Err(err) = self.fs.chown(&path, uid, gid) {
                reply.error(errno(&err));
                return;
            }
        }

        if let Some(size) = size {
            let truncated = match fh {
                Some(fh) => self.fs.ftruncate(HandleId::new(fh), size),
                None => self.fs.truncate(&path, size),
            };
            if let Err(err) = truncated {
                reply.error(errno(&err));
                return;
            }
        }

        if atime.is_some() || mtime.is_some() {
            if let Err(err) =
                self.fs
                    .set_times(&path, atime.map(system_time), mtime.map(system_time))
            {
                reply.error(errno(&err));
                return;
            }
        }

        match self.fs.getattr(&path) {
            Ok(stat) => reply.attr(&self.attr_ttl, &fuse_attr(ino, &stat)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.readlink(&path) {
            Ok(target) => reply.data(&target),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.inodes.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        if let Err(err) = self.fs.mknod(&path, mode, rdev as u64) {
            reply.error(errno(&err));
            return;
        }

        match self.fs.getattr(&path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_insert(&path);
                reply.entry(&self.entry_ttl, &fuse_attr(ino, &stat), 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.inodes.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        if let Err(err) = self.fs.mkdir(&path, mode & 0o7777) {
            reply.error(errno(&err));
            return;
        }

        match self.fs.getattr(&path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_insert(&path);
                reply.entry(&self.entry_ttl, &fuse_attr(ino, &stat), 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.inodes.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.unlink(&path) {
            Ok(()) => {
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.inodes.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.rmdir(&path) {
            Ok(()) => {
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let path = match self.inodes.child_path(parent, link_name) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        if let Err(err) = self.fs.symlink(&path, target.as_os_str().as_bytes()) {
            reply.error(errno(&err));
            return;
        }

        match self.fs.getattr(&path) {
            Ok(stat) => {
                let ino = self.inodes.get_or_insert(&path);
                reply.entry(&self.entry_ttl, &fuse_attr(ino, &stat), 0);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (old, new) = match (
            self.inodes.child_path(parent, name),
            self.inodes.child_path(newparent, newname),
        ) {
            (Some(old), Some(new)) => (old, new),
            _ => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.rename(&old, &new) {
            Ok(()) => {
                self.inodes.rename_path(&old, &new);
                reply.ok();
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.open(&path, &open_options(flags)) {
            Ok(handle) => reply.opened(handle.raw(), 0),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.inodes.child_path(parent, name) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let handle = match self.fs.create(&path, mode & 0o7777, &open_options(flags)) {
            Ok(handle) => handle,
            Err(err) => {
                reply.error(errno(&err));
                return;
            }
        };

        match self.fs.fgetattr(handle) {
            Ok(stat) => {
                let ino = self.inodes.get_or_insert(&path);
                reply.created(&self.entry_ttl, &fuse_attr(ino, &stat), 0, handle.raw(), 0);
            }
            Err(err) => {
                let _ = self.fs.release(handle);
                reply.error(errno(&err));
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut buf = vec![0u8; size as usize];
        match self.fs.read(HandleId::new(fh), offset as u64, &mut buf) {
            Ok(bytes_read) => {
                buf.truncate(bytes_read);
                reply.data(&buf);
            }
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.fs.write(HandleId::new(fh), offset as u64, data) {
            Ok(bytes_written) => reply.written(bytes_written as u32),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        match self.fs.flush(HandleId::new(fh)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.fs.release(HandleId::new(fh)) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        match self.fs.fsync(HandleId::new(fh), datasync) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        if self.inodes.path(ino).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        reply.opened(0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        let listed = match self.fs.readdir(&path) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(errno(&err));
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, OsString)> = vec![
            (ino, FileType::Directory, OsString::from(".")),
            (ino, FileType::Directory, OsString::from("..")),
        ];
        for entry in listed {
            let child = path.join(&entry.name);
            let child_ino = self.inodes.get_or_insert(&child);
            entries.push((child_ino, fuse_kind(entry.kind), entry.name));
        }

        for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, ino: u64, reply: ReplyStatfs) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.statfs(&path) {
            Ok(stats) => reply.statfs(
                stats.blocks,
                stats.blocks_free,
                stats.blocks_available,
                stats.files,
                stats.files_free,
                stats.block_size,
                stats.name_max,
                stats.fragment_size,
            ),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = match self.path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };

        match self.fs.access(&path, mask) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }
}
