//! The two timed transfer operations.
//!
//! Every transfer is measured through two windows on the same time source:
//!
//! ```text
//! write:  host   |-- sync_to_device --|------ pwrite ------|
//!         device                      |------ pwrite ------|
//!
//! read:   host   |------ pread ------|-- sync_from_device --|
//!         device |------ pread ------|
//! ```
//!
//! The host window is what the calling process experiences, the device
//! window is the storage DMA alone. A failed or short write is logged and the
//! sample kept; a read that returns no data aborts the run.

use serde::Serialize;

use crate::clock::{Stopwatch, TimeSource};
use crate::device::DeviceBuffer;
use crate::error::{Error, ErrorKind, Result};
use crate::storage::{Access, StorageHandle};

const BYTES_PER_MB: f64 = 1_048_576.0;
const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Which way a transfer moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Device buffer to storage.
    Write,
    /// Storage to device buffer.
    Read,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Write, Direction::Read];

    /// The storage access a transfer in this direction needs.
    pub fn access(self) -> Access {
        match self {
            Direction::Write => Access::Write,
            Direction::Read => Access::Read,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Write => "write",
            Direction::Read => "read",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whose view of a transfer a measurement is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Observer {
    /// Full operation including buffer synchronization.
    Host,
    /// The storage DMA step only.
    Device,
}

impl Observer {
    pub const ALL: [Observer; 2] = [Observer::Host, Observer::Device];

    pub fn as_str(self) -> &'static str {
        match self {
            Observer::Host => "host",
            Observer::Device => "device",
        }
    }
}

impl std::fmt::Display for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Throughput of one transfer, from both observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferResult {
    pub direction: Direction,
    /// Bytes the transfer was asked to move.
    pub bytes: usize,
    pub device_micros: u64,
    pub host_micros: u64,
    /// MB/s over the device window.
    pub device_mbps: f64,
    /// MB/s over the host window.
    pub host_mbps: f64,
}

impl TransferResult {
    fn new(direction: Direction, bytes: usize, device_micros: u64, host_micros: u64) -> Self {
        Self {
            direction,
            bytes,
            device_micros,
            host_micros,
            device_mbps: throughput_mbps(bytes, device_micros),
            host_mbps: throughput_mbps(bytes, host_micros),
        }
    }

    /// Throughput seen by `observer`.
    pub fn mbps(&self, observer: Observer) -> f64 {
        match observer {
            Observer::Host => self.host_mbps,
            Observer::Device => self.device_mbps,
        }
    }
}

/// `(bytes / 2^20) / (micros / 10^6)` MB/s.
///
/// A window shorter than the clock resolution counts as one microsecond so
/// the result stays finite.
pub fn throughput_mbps(bytes: usize, micros: u64) -> f64 {
    let micros = micros.max(1);
    (bytes as f64 / BYTES_PER_MB) / (micros as f64 / MICROS_PER_SEC)
}

fn check_len<B: DeviceBuffer + ?Sized>(
    buffer: &B,
    len: usize,
    operation: &'static str,
) -> Result<()> {
    if buffer.len() != len {
        return Err(Error::new(
            ErrorKind::ConfigInvalid,
            format!(
                "device buffer holds {} bytes, transfer size is {len}",
                buffer.len()
            ),
        )
        .with_operation(operation));
    }
    Ok(())
}

/// Move `len` bytes from the device buffer to storage offset 0.
///
/// `buffer` must already hold the data and be exactly `len` bytes. Write
/// failures are reported through `tracing` and do not fail the call; only a
/// device sync failure does.
pub fn write_transfer<H, B, T>(
    handle: &mut H,
    buffer: &mut B,
    len: usize,
    clock: &T,
) -> Result<TransferResult>
where
    H: StorageHandle + ?Sized,
    B: DeviceBuffer + ?Sized,
    T: TimeSource + ?Sized,
{
    check_len(buffer, len, "write_transfer")?;

    let sync_at = clock.now_micros();
    let host = Stopwatch::start_at(clock, sync_at);
    buffer
        .sync_to_device()
        .map_err(|e| e.with_operation("write_transfer"))?;

    let write_at = clock.now_micros();
    let device = Stopwatch::start_at(clock, write_at);
    let outcome = handle.write_at(buffer.as_slice(), 0);

    let now = clock.now_micros();
    let device_micros = device.elapsed_at(now);
    let host_micros = host.elapsed_at(now);

    // Both windows are closed; logging from here on is not measured.
    tracing::trace!(sync_at, write_at, done_at = now, "write transfer steps");
    match outcome {
        Ok(n) if n == len => {}
        Ok(n) => tracing::error!(
            operation = "write_transfer",
            written = n,
            expected = len,
            "short p2p write"
        ),
        Err(e) => tracing::error!(
            operation = "write_transfer",
            error = %e,
            "p2p write failed"
        ),
    }

    let result = TransferResult::new(Direction::Write, len, device_micros, host_micros);
    tracing::debug!(
        device_us = device_micros,
        host_us = host_micros,
        device_mbps = result.device_mbps,
        host_mbps = result.host_mbps,
        "write transfer"
    );
    Ok(result)
}

/// Move `len` bytes from storage offset 0 into the device buffer.
///
/// A read that errors or returns no data is a [`ErrorKind::ReadFailed`]
/// error; a short but non-empty read is logged and measured.
pub fn read_transfer<H, B, T>(
    handle: &mut H,
    buffer: &mut B,
    len: usize,
    clock: &T,
) -> Result<TransferResult>
where
    H: StorageHandle + ?Sized,
    B: DeviceBuffer + ?Sized,
    T: TimeSource + ?Sized,
{
    check_len(buffer, len, "read_transfer")?;

    let read_at = clock.now_micros();
    let host = Stopwatch::start_at(clock, read_at);
    let device = Stopwatch::start_at(clock, read_at);

    let outcome = handle.read_at(buffer.as_mut_slice(), 0);
    let sync_at = clock.now_micros();
    let device_micros = device.elapsed_at(sync_at);

    let read = match outcome {
        Ok(0) => {
            return Err(Error::new(ErrorKind::ReadFailed, "pread returned no data")
                .with_operation("read_transfer")
                .with_context("expected", len.to_string()));
        }
        Ok(n) => n,
        Err(e) => {
            return Err(Error::new(ErrorKind::ReadFailed, "read transfer failed")
                .with_operation("read_transfer")
                .with_context("expected", len.to_string())
                .set_source(e));
        }
    };

    buffer
        .sync_from_device()
        .map_err(|e| e.with_operation("read_transfer"))?;
    let now = clock.now_micros();
    let host_micros = host.elapsed_at(now);

    // Both windows are closed; logging from here on is not measured.
    tracing::trace!(read_at, sync_at, done_at = now, "read transfer steps");
    if read < len {
        tracing::warn!(
            operation = "read_transfer",
            read,
            expected = len,
            "short p2p read"
        );
    }

    let result = TransferResult::new(Direction::Read, len, device_micros, host_micros);
    tracing::debug!(
        device_us = device_micros,
        host_us = host_micros,
        device_mbps = result.device_mbps,
        host_mbps = result.host_mbps,
        "read transfer"
    );
    Ok(result)
}

/// Run the transfer for `direction`.
pub fn transfer<H, B, T>(
    direction: Direction,
    handle: &mut H,
    buffer: &mut B,
    len: usize,
    clock: &T,
) -> Result<TransferResult>
where
    H: StorageHandle + ?Sized,
    B: DeviceBuffer + ?Sized,
    T: TimeSource + ?Sized,
{
    match direction {
        Direction::Write => write_transfer(handle, buffer, len, clock),
        Direction::Read => read_transfer(handle, buffer, len, clock),
    }
}
