//! Xilinx XRT backend over the XRT C API (`libxrt_core`).
//!
//! Buffers are allocated with `XCL_BO_FLAGS_P2P`, so their host mapping is a
//! window onto device memory exposed through the PCIe BAR. An `O_DIRECT`
//! `pwrite` from that mapping is serviced by the NVMe controller reading the
//! accelerator's memory directly.

use std::ffi::c_void;
use std::path::Path;

use crate::device::DeviceBuffer;
use crate::error::{Error, ErrorKind, Result};

type XclDeviceHandle = *mut c_void;
type XclBufferHandle = u32;

const NULLBO: XclBufferHandle = 0xffff_ffff;
const XCL_QUIET: i32 = 0;
const XCL_BO_FLAGS_P2P: u32 = 1 << 30;
const XCL_BO_SYNC_BO_TO_DEVICE: i32 = 0;
const XCL_BO_SYNC_BO_FROM_DEVICE: i32 = 1;
const XCLBIN_MAGIC: &[u8; 8] = b"xclbin2\0";

#[link(name = "xrt_core")]
unsafe extern "C" {
    fn xclOpen(device_index: u32, log_file: *const libc::c_char, level: i32) -> XclDeviceHandle;
    fn xclClose(handle: XclDeviceHandle);
    fn xclLoadXclBin(handle: XclDeviceHandle, buffer: *const c_void) -> i32;
    fn xclAllocBO(handle: XclDeviceHandle, size: usize, unused: i32, flags: u32) -> XclBufferHandle;
    fn xclMapBO(handle: XclDeviceHandle, bo: XclBufferHandle, write: bool) -> *mut c_void;
    fn xclUnmapBO(handle: XclDeviceHandle, bo: XclBufferHandle, addr: *mut c_void) -> i32;
    fn xclSyncBO(
        handle: XclDeviceHandle,
        bo: XclBufferHandle,
        dir: i32,
        size: usize,
        offset: usize,
    ) -> i32;
    fn xclFreeBO(handle: XclDeviceHandle, bo: XclBufferHandle);
}

/// An open XRT device.
pub struct XrtDevice {
    handle: XclDeviceHandle,
    index: u32,
}

impl XrtDevice {
    /// Open the accelerator at `index`.
    pub fn open(index: u32) -> Result<Self> {
        // SAFETY: a null log file name is accepted by xclOpen.
        let handle = unsafe { xclOpen(index, std::ptr::null(), XCL_QUIET) };
        if handle.is_null() {
            return Err(Error::new(ErrorKind::DeviceError, "xclOpen returned no device")
                .with_operation("XrtDevice::open")
                .with_context("device_index", index.to_string()));
        }
        tracing::info!(device_index = index, "opened XRT device");
        Ok(Self { handle, index })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Program the device with an xclbin image.
    pub fn load_xclbin(&self, path: &Path) -> Result<()> {
        let image = std::fs::read(path).map_err(|e| {
            Error::new(ErrorKind::DeviceError, "failed to read xclbin")
                .with_operation("XrtDevice::load_xclbin")
                .with_context("path", path.display().to_string())
                .set_source(e)
        })?;
        if !image.starts_with(XCLBIN_MAGIC) {
            return Err(Error::new(ErrorKind::ConfigInvalid, "not an xclbin2 image")
                .with_operation("XrtDevice::load_xclbin")
                .with_context("path", path.display().to_string()));
        }
        // SAFETY: image holds a complete axlf blob and outlives the call.
        let ret = unsafe { xclLoadXclBin(self.handle, image.as_ptr() as *const c_void) };
        if ret != 0 {
            return Err(Error::new(
                ErrorKind::DeviceError,
                format!(
                    "xclLoadXclBin failed: {}",
                    std::io::Error::from_raw_os_error(-ret)
                ),
            )
            .with_operation("XrtDevice::load_xclbin")
            .with_context("path", path.display().to_string()));
        }
        tracing::info!(path = %path.display(), "loaded xclbin");
        Ok(())
    }

    /// Allocate a peer-to-peer buffer of `size` bytes in memory bank `bank`
    /// and map it into the process.
    pub fn alloc_p2p(&self, size: usize, bank: u32) -> Result<XrtBuffer<'_>> {
        // SAFETY: handle is an open device.
        let bo = unsafe { xclAllocBO(self.handle, size, 0, XCL_BO_FLAGS_P2P | bank) };
        if bo == NULLBO {
            return Err(Error::new(ErrorKind::DeviceError, "xclAllocBO failed")
                .with_operation("XrtDevice::alloc_p2p")
                .with_context("size", size.to_string())
                .with_context("bank", bank.to_string()));
        }
        // SAFETY: bo was just allocated on this device.
        let map = unsafe { xclMapBO(self.handle, bo, true) };
        if map.is_null() {
            // SAFETY: bo is unmapped and owned here.
            unsafe { xclFreeBO(self.handle, bo) };
            return Err(Error::new(ErrorKind::DeviceError, "xclMapBO failed")
                .with_operation("XrtDevice::alloc_p2p")
                .with_context("size", size.to_string()));
        }
        tracing::debug!(bo, size, bank, "allocated P2P buffer");
        Ok(XrtBuffer {
            device: self,
            bo,
            map: map as *mut u8,
            len: size,
        })
    }
}

impl Drop for XrtDevice {
    fn drop(&mut self) {
        // SAFETY: handle came from xclOpen; buffers borrow self so are gone.
        unsafe { xclClose(self.handle) };
    }
}

/// A mapped peer-to-peer buffer object.
pub struct XrtBuffer<'d> {
    device: &'d XrtDevice,
    bo: XclBufferHandle,
    map: *mut u8,
    len: usize,
}

impl XrtBuffer<'_> {
    fn sync(&mut self, dir: i32, operation: &'static str) -> Result<()> {
        // SAFETY: bo belongs to device and len is its allocated size.
        let ret = unsafe { xclSyncBO(self.device.handle, self.bo, dir, self.len, 0) };
        if ret != 0 {
            return Err(Error::new(
                ErrorKind::DeviceError,
                format!("xclSyncBO failed: {}", std::io::Error::from_raw_os_error(-ret)),
            )
            .with_operation(operation)
            .with_context("bo", self.bo.to_string()));
        }
        Ok(())
    }
}

impl DeviceBuffer for XrtBuffer<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: map is valid for len bytes until the buffer is dropped.
        unsafe { std::slice::from_raw_parts(self.map, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, exclusive through &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.map, self.len) }
    }

    fn sync_to_device(&mut self) -> Result<()> {
        self.sync(XCL_BO_SYNC_BO_TO_DEVICE, "XrtBuffer::sync_to_device")
    }

    fn sync_from_device(&mut self) -> Result<()> {
        self.sync(XCL_BO_SYNC_BO_FROM_DEVICE, "XrtBuffer::sync_from_device")
    }
}

impl Drop for XrtBuffer<'_> {
    fn drop(&mut self) {
        // SAFETY: map and bo were created together in alloc_p2p.
        unsafe {
            xclUnmapBO(self.device.handle, self.bo, self.map as *mut c_void);
            xclFreeBO(self.device.handle, self.bo);
        }
    }
}
