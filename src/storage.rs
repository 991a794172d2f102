//! Storage collaborator: per-transfer handles onto the target file or block
//! device.
//!
//! The harness only needs open, one positioned write or read, and close.
//! [`DirectStorage`] provides them with raw POSIX calls so that the buffer
//! pointer handed to `pwrite`/`pread` is exactly the device buffer mapping;
//! the standard library would be free to stage through its own memory.

use std::ffi::CString;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};

/// What a handle will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Device buffer to storage. Opened read/write.
    Write,
    /// Storage to device buffer. Opened read-only.
    Read,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Write => f.write_str("write"),
            Access::Read => f.write_str("read"),
        }
    }
}

/// Opens handles onto a storage path.
pub trait Storage {
    type Handle: StorageHandle;

    /// Open `path` for a single transfer in the given direction.
    fn open(&mut self, path: &Path, access: Access) -> Result<Self::Handle>;
}

/// An open storage path. Dropping the handle closes it.
pub trait StorageHandle {
    /// One positioned write of `buf` at `offset`. Returns the bytes written,
    /// which may be fewer than `buf.len()`.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize>;

    /// One positioned read into `buf` at `offset`. Returns the bytes read;
    /// zero means end of file.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Close the handle.
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// Opens storage paths with POSIX `open(2)`, optionally with `O_DIRECT`.
#[derive(Debug, Clone, Copy)]
pub struct DirectStorage {
    direct: bool,
}

impl DirectStorage {
    /// `direct = false` drops `O_DIRECT`, for filesystems such as tmpfs that
    /// reject it.
    pub fn new(direct: bool) -> Self {
        Self { direct }
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }

    fn flags(&self, access: Access) -> i32 {
        let base = match access {
            Access::Write => libc::O_RDWR,
            Access::Read => libc::O_RDONLY,
        };
        if self.direct {
            base | libc::O_DIRECT
        } else {
            base
        }
    }
}

impl Storage for DirectStorage {
    type Handle = DirectFile;

    fn open(&mut self, path: &Path, access: Access) -> Result<DirectFile> {
        let fd = posix_open(path, self.flags(access)).map_err(|e| {
            e.with_operation("DirectStorage::open")
                .with_context("access", access.to_string())
                .with_context("direct", self.direct.to_string())
        })?;
        tracing::trace!(path = %path.display(), %access, fd, "opened storage handle");
        Ok(DirectFile {
            fd,
            path: path.to_path_buf(),
        })
    }
}

/// A file descriptor opened by [`DirectStorage`].
#[derive(Debug)]
pub struct DirectFile {
    fd: RawFd,
    path: PathBuf,
}

impl DirectFile {
    /// Returns the raw file descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Returns the path this handle was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageHandle for DirectFile {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        // SAFETY: buf is a live slice of buf.len() bytes, fd is open.
        let ret = unsafe {
            libc::pwrite(
                self.fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                offset as libc::off_t,
            )
        };
        if ret < 0 {
            Err(Error::last_os_error(ErrorKind::WriteFailed, "pwrite")
                .with_operation("DirectFile::write_at")
                .with_context("path", self.path.display().to_string())
                .with_context("count", buf.len().to_string())
                .with_context("offset", offset.to_string()))
        } else {
            Ok(ret as usize)
        }
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        // SAFETY: buf is a live, writable slice of buf.len() bytes, fd is open.
        let ret = unsafe {
            libc::pread(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                offset as libc::off_t,
            )
        };
        if ret < 0 {
            Err(Error::last_os_error(ErrorKind::ReadFailed, "pread")
                .with_operation("DirectFile::read_at")
                .with_context("path", self.path.display().to_string())
                .with_context("count", buf.len().to_string())
                .with_context("offset", offset.to_string()))
        } else {
            Ok(ret as usize)
        }
    }
}

impl Drop for DirectFile {
    fn drop(&mut self) {
        posix_close(self.fd);
        self.fd = -1;
    }
}

/// Open a path with POSIX `open(2)`. The path must already exist.
pub fn posix_open(path: &Path, flags: i32) -> Result<RawFd> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| {
        Error::new(
            ErrorKind::ConfigInvalid,
            format!("path contains null byte: {}", path.display()),
        )
        .with_operation("posix_open")
    })?;

    // SAFETY: c_path is a valid C string.
    let fd = unsafe { libc::open(c_path.as_ptr(), flags) };
    if fd < 0 {
        Err(Error::last_os_error(ErrorKind::SystemError, "open")
            .with_operation("posix_open")
            .with_context("path", path.display().to_string()))
    } else {
        Ok(fd)
    }
}

/// Close a file descriptor. Errors on close are ignored.
pub fn posix_close(fd: RawFd) {
    if fd >= 0 {
        // SAFETY: we only close descriptors we opened.
        unsafe {
            libc::close(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_nonexistent_path() {
        let mut storage = DirectStorage::new(false);
        let err = storage
            .open(Path::new("/nonexistent/nvme0n1/p2p.bin"), Access::Write)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.operation(), "DirectStorage::open");
        assert!(
            err.context_iter()
                .any(|(k, v)| k == "path" && v.contains("p2p.bin"))
        );
    }

    #[test]
    fn test_open_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let mut storage = DirectStorage::new(false);
        assert!(storage.open(&path, Access::Write).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_path_with_nul_is_config_error() {
        let err = posix_open(Path::new("bad\0path"), libc::O_RDONLY).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_flags() {
        let direct = DirectStorage::new(true);
        assert_eq!(direct.flags(Access::Write), libc::O_RDWR | libc::O_DIRECT);
        assert_eq!(direct.flags(Access::Read), libc::O_RDONLY | libc::O_DIRECT);
        let buffered = DirectStorage::new(false);
        assert_eq!(buffered.flags(Access::Write), libc::O_RDWR);
    }

    #[test]
    fn test_write_then_read_at_offset_zero() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut storage = DirectStorage::new(false);

        let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let mut handle = storage.open(tmp.path(), Access::Write).unwrap();
        assert_eq!(handle.write_at(&data, 0).unwrap(), data.len());
        handle.close();

        let mut handle = storage.open(tmp.path(), Access::Read).unwrap();
        let mut buf = vec![0u8; data.len()];
        assert_eq!(handle.read_at(&mut buf, 0).unwrap(), data.len());
        assert_eq!(buf, data);
    }

    #[test]
    fn test_read_empty_file_returns_zero() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut storage = DirectStorage::new(false);
        let mut handle = storage.open(tmp.path(), Access::Read).unwrap();
        let mut buf = vec![0u8; 512];
        assert_eq!(handle.read_at(&mut buf, 0).unwrap(), 0);
    }

    #[test]
    fn test_short_read() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[7u8; 100]).unwrap();
        tmp.flush().unwrap();

        let mut storage = DirectStorage::new(false);
        let mut handle = storage.open(tmp.path(), Access::Read).unwrap();
        let mut buf = vec![0u8; 4096];
        assert_eq!(handle.read_at(&mut buf, 0).unwrap(), 100);
    }

    #[test]
    fn test_write_on_read_only_handle_fails() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut storage = DirectStorage::new(false);
        let mut handle = storage.open(tmp.path(), Access::Read).unwrap();
        let err = handle.write_at(&[1u8; 16], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailed);
        assert_eq!(err.operation(), "DirectFile::write_at");
    }

    #[test]
    fn test_close_invalid_fd() {
        posix_close(-1);
    }
}
