//! Error types for the NLINKFS core

use std::io;

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("not a symlink")]
    NotALink,
    #[error("already exists")]
    AlreadyExists,
    #[error("access denied")]
    AccessDenied,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("bad file handle")]
    BadHandle,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported")]
    Unsupported,
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Classify an I/O error from the backing store, keeping the common
    /// lookup outcomes as their own variants.
    pub fn from_backing(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            io::ErrorKind::PermissionDenied => FsError::AccessDenied,
            io::ErrorKind::NotADirectory => FsError::NotADirectory,
            io::ErrorKind::IsADirectory => FsError::IsADirectory,
            io::ErrorKind::DirectoryNotEmpty => FsError::NotEmpty,
            io::ErrorKind::InvalidInput => FsError::InvalidArgument,
            _ => FsError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(FsError::NotFound.to_string(), "not found");
        assert_eq!(FsError::NotALink.to_string(), "not a symlink");
    }

    #[test]
    fn test_from_backing_classifies_lookup_errors() {
        let err = FsError::from_backing(io::Error::from_raw_os_error(libc::ENOENT));
        assert!(matches!(err, FsError::NotFound));

        let err = FsError::from_backing(io::Error::from_raw_os_error(libc::EEXIST));
        assert!(matches!(err, FsError::AlreadyExists));

        let err = FsError::from_backing(io::Error::from_raw_os_error(libc::ENOTDIR));
        assert!(matches!(err, FsError::NotADirectory));

        let err = FsError::from_backing(io::Error::from_raw_os_error(libc::ENOTEMPTY));
        assert!(matches!(err, FsError::NotEmpty));

        let err = FsError::from_backing(io::Error::from_raw_os_error(libc::EIO));
        assert!(matches!(err, FsError::Io(_)));
    }

    #[test]
    fn test_from_backing_keeps_raw_errno() {
        let err = FsError::from_backing(io::Error::from_raw_os_error(libc::ENOSPC));
        match err {
            FsError::Io(inner) => assert_eq!(inner.raw_os_error(), Some(libc::ENOSPC)),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
