//! # p2pbench
//!
//! Peer-to-peer throughput benchmark between an accelerator's device buffer
//! and block storage.
//!
//! Each iteration moves the whole device buffer to storage with one direct
//! write and back with one direct read. Every transfer is timed twice:
//!
//! - **host-observed**: what the calling process sees, including buffer
//!   synchronization between the host mapping and device memory;
//! - **device-observed**: the storage DMA step alone.
//!
//! ## Architecture
//!
//! The harness ([`bench::Benchmark`]) drives the two transfer operations in
//! [`transfer`] and folds their results into [`stats::Aggregator`]. Its
//! collaborators are injected:
//!
//! - [`device::DeviceBuffer`]: the buffer and its sync operations
//!   ([`device::HostBuffer`], or the Xilinx XRT backend);
//! - [`storage::Storage`]: opens the target path per transfer
//!   ([`storage::DirectStorage`] uses `O_DIRECT`);
//! - [`clock::TimeSource`]: the monotonic clock both stopwatches read.
//!
//! ## Feature Flags
//!
//! - `xrt`: Xilinx XRT device backend (links `libxrt_core`).

pub mod align;
pub mod bench;
pub mod cli;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod report;
pub mod stats;
pub mod storage;
pub mod transfer;

pub use bench::{Benchmark, IterationProgress, Phase};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use report::Report;
pub use transfer::{Direction, Observer, TransferResult};
