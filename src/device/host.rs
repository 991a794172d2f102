use std::sync::atomic::{Ordering, fence};

use crate::align::{align_up, page_size};
use crate::device::DeviceBuffer;
use crate::error::{Error, ErrorKind, Result};

/// Page-aligned host memory standing in for a device buffer.
///
/// The allocation is rounded up to whole pages so `O_DIRECT` accepts the
/// address, but only the requested length is exposed.
pub struct HostBuffer {
    ptr: *mut u8,
    len: usize,
}

impl HostBuffer {
    /// Allocate a zeroed, page-aligned buffer of `len` bytes.
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::new(ErrorKind::ConfigInvalid, "buffer size must be non-zero")
                .with_operation("HostBuffer::new"));
        }
        let ps = page_size();
        let alloc_len = align_up(len, ps);
        let mut ptr: *mut libc::c_void = std::ptr::null_mut();
        // SAFETY: ps is a power of two and a multiple of the pointer size.
        let ret = unsafe { libc::posix_memalign(&mut ptr, ps, alloc_len) };
        if ret != 0 || ptr.is_null() {
            return Err(Error::new(
                ErrorKind::DeviceError,
                format!(
                    "posix_memalign failed: {}",
                    std::io::Error::from_raw_os_error(ret)
                ),
            )
            .with_operation("HostBuffer::new")
            .with_context("size", alloc_len.to_string()));
        }
        // SAFETY: ptr is valid for alloc_len bytes.
        unsafe { std::ptr::write_bytes(ptr as *mut u8, 0, alloc_len) };
        Ok(Self {
            ptr: ptr as *mut u8,
            len,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }
}

impl DeviceBuffer for HostBuffer {
    fn len(&self) -> usize {
        self.len
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    fn sync_to_device(&mut self) -> Result<()> {
        fence(Ordering::SeqCst);
        Ok(())
    }

    fn sync_from_device(&mut self) -> Result<()> {
        fence(Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr came from posix_memalign and is freed once.
        unsafe { libc::free(self.ptr as *mut libc::c_void) };
    }
}

impl std::fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: The buffer is solely owned and not shared.
unsafe impl Send for HostBuffer {}
