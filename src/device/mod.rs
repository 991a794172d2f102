//! Device collaborator: the accelerator buffer transfers move through.
//!
//! A [`DeviceBuffer`] is allocated once per run by the caller and borrowed by
//! the benchmark. Its host-visible mapping is what the storage calls read
//! from and write into; the two sync calls move data between that mapping and
//! device-global memory.
//!
//! Backends:
//! - [`HostBuffer`]: page-aligned host memory. Sync calls are ordering fences,
//!   so a run measures plain host-staged direct I/O.
//! - `xrt::XrtBuffer` (feature `xrt`): a peer-to-peer buffer object on a
//!   Xilinx accelerator.

mod host;
#[cfg(feature = "xrt")]
pub mod xrt;

pub use host::HostBuffer;

use crate::error::Result;

/// A device-resident buffer with a host-visible mapping.
pub trait DeviceBuffer {
    /// Size of the buffer in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The host-visible mapping.
    fn as_slice(&self) -> &[u8];

    /// The host-visible mapping, writable.
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Push the mapping's contents to device-global memory. Blocks until the
    /// data movement completes.
    fn sync_to_device(&mut self) -> Result<()>;

    /// Pull device-global memory back into the mapping. Blocks until the
    /// data movement completes.
    fn sync_from_device(&mut self) -> Result<()>;
}

impl<B: DeviceBuffer + ?Sized> DeviceBuffer for &mut B {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn as_slice(&self) -> &[u8] {
        (**self).as_slice()
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        (**self).as_mut_slice()
    }

    fn sync_to_device(&mut self) -> Result<()> {
        (**self).sync_to_device()
    }

    fn sync_from_device(&mut self) -> Result<()> {
        (**self).sync_from_device()
    }
}

/// Word written over the whole buffer before the first transfer.
pub const FILL_WORD: u32 = 1;

/// Fill the mapping with little-endian [`FILL_WORD`]s.
///
/// A trailing partial word gets the leading bytes of the pattern.
pub fn fill_pattern(buf: &mut [u8]) {
    let word = FILL_WORD.to_le_bytes();
    for chunk in buf.chunks_mut(word.len()) {
        chunk.copy_from_slice(&word[..chunk.len()]);
    }
}
