//! The benchmark session: N sequential write/read iterations over one
//! device buffer.
//!
//! ```text
//! Init --run--> Iterating --N done--> Reporting --> Done
//!                   |
//!                   +--fatal error--> Aborted
//! ```
//!
//! Every transfer gets its own storage handle, opened right before and closed
//! right after it. Both results of an iteration are recorded together once
//! the read has completed, so a fatal read leaves that iteration unrecorded.

use std::path::{Path, PathBuf};

use crate::clock::TimeSource;
use crate::config::Config;
use crate::device::DeviceBuffer;
use crate::error::{Error, ErrorKind, Result};
use crate::report::Report;
use crate::stats::Aggregator;
use crate::storage::{Storage, StorageHandle};
use crate::transfer::{Direction, TransferResult, transfer};

/// Where a [`Benchmark`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Iterating,
    Reporting,
    Done,
    /// A fatal error stopped the run. Statistics hold what completed.
    Aborted,
}

/// Passed to the progress callback before each iteration starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationProgress {
    /// Zero-based iteration index.
    pub index: usize,
    /// Time since the run started.
    pub elapsed_micros: u64,
}

/// One benchmark session.
///
/// The device buffer is borrowed for the whole session and reused by every
/// transfer; whoever allocated it keeps ownership.
pub struct Benchmark<'a, B, S, C>
where
    B: DeviceBuffer + ?Sized,
    S: Storage,
    C: TimeSource,
{
    iterations: usize,
    path: PathBuf,
    transfer_size: usize,
    buffer: &'a mut B,
    storage: S,
    clock: C,
    stats: Aggregator,
    phase: Phase,
}

impl<'a, B, S, C> Benchmark<'a, B, S, C>
where
    B: DeviceBuffer + ?Sized,
    S: Storage,
    C: TimeSource,
{
    /// Set up a session from `config`.
    ///
    /// Fails if there is nothing to iterate, no storage path, or the buffer
    /// does not match the configured transfer size.
    pub fn new(config: &Config, buffer: &'a mut B, storage: S, clock: C) -> Result<Self> {
        if config.iterations == 0 {
            return Err(
                Error::new(ErrorKind::ConfigInvalid, "iterations must be at least 1")
                    .with_operation("Benchmark::new"),
            );
        }
        let path = match &config.file_path {
            Some(p) if !p.as_os_str().is_empty() => p.clone(),
            _ => {
                return Err(Error::new(
                    ErrorKind::ConfigInvalid,
                    "a storage file path is required",
                )
                .with_operation("Benchmark::new"));
            }
        };
        if buffer.len() != config.transfer_size {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "device buffer size differs from the transfer size",
            )
            .with_operation("Benchmark::new")
            .with_context("buffer_len", buffer.len().to_string())
            .with_context("transfer_size", config.transfer_size.to_string()));
        }

        Ok(Self {
            iterations: config.iterations,
            path,
            transfer_size: config.transfer_size,
            buffer,
            storage,
            clock,
            stats: Aggregator::new(),
            phase: Phase::Init,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Statistics recorded so far.
    pub fn stats(&self) -> &Aggregator {
        &self.stats
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run every iteration and build the report.
    ///
    /// `on_iteration` is called before each iteration. A session runs once;
    /// calling `run` again is an error.
    pub fn run<F>(&mut self, mut on_iteration: F) -> Result<Report>
    where
        F: FnMut(&IterationProgress),
    {
        if self.phase != Phase::Init {
            return Err(
                Error::new(ErrorKind::Unexpected, "benchmark session has already run")
                    .with_operation("Benchmark::run")
                    .with_context("phase", format!("{:?}", self.phase)),
            );
        }

        tracing::info!(
            path = %self.path.display(),
            iterations = self.iterations,
            transfer_size = self.transfer_size,
            "starting benchmark"
        );
        self.phase = Phase::Iterating;
        let started = self.clock.now_micros();

        for index in 0..self.iterations {
            on_iteration(&IterationProgress {
                index,
                elapsed_micros: self.clock.now_micros().saturating_sub(started),
            });

            let outcome = self
                .transfer_once(Direction::Write)
                .and_then(|write| self.transfer_once(Direction::Read).map(|read| (write, read)));
            let (write, read) = match outcome {
                Ok(pair) => pair,
                Err(e) => {
                    self.phase = Phase::Aborted;
                    tracing::error!(iteration = index, error = %e, "benchmark aborted");
                    return Err(e.with_context("iteration", index.to_string()));
                }
            };
            self.stats.record(&write);
            self.stats.record(&read);
        }

        self.phase = Phase::Reporting;
        let total_micros = self.clock.now_micros().saturating_sub(started);
        let report = Report::from_stats(
            &self.stats,
            self.transfer_size,
            self.iterations,
            total_micros,
        );
        self.phase = Phase::Done;
        tracing::info!(total_us = total_micros, "benchmark finished");
        Ok(report)
    }

    fn transfer_once(&mut self, direction: Direction) -> Result<TransferResult> {
        let mut handle = self
            .storage
            .open(&self.path, direction.access())
            .map_err(|e| {
                e.with_operation("Benchmark::run")
                    .with_context("path", self.path.display().to_string())
            })?;
        let result = transfer(
            direction,
            &mut handle,
            &mut *self.buffer,
            self.transfer_size,
            &self.clock,
        );
        handle.close();
        result
    }
}
