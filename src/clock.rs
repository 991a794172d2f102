//! Microsecond stopwatches over a pluggable monotonic time source.
//!
//! Transfers are timed with two overlapping [`Stopwatch`]es. Both read the
//! same [`TimeSource`], so a simulated source ([`ManualClock`]) makes every
//! timing window in the harness deterministic.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// A monotonic time source with microsecond resolution.
pub trait TimeSource {
    /// Microseconds since an arbitrary, fixed origin. Never decreases.
    fn now_micros(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Rc<T> {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }
}

/// Wall-clock source backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now_micros(&self) -> u64 {
        // u64 microseconds covers ~584k years.
        self.origin.elapsed().as_micros() as u64
    }
}

/// Deterministic time source that only moves when told to.
///
/// Simulated collaborators share it (usually through an `Rc`) and call
/// [`advance`](Self::advance) to model how long each step takes.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `micros`.
    pub fn advance(&self, micros: u64) {
        self.now.set(self.now.get().saturating_add(micros));
    }
}

impl TimeSource for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.get()
    }
}

/// Elapsed-time measurement since the last reset.
///
/// A new stopwatch is already running; there is no pause.
#[derive(Debug, Clone)]
pub struct Stopwatch<T: TimeSource> {
    source: T,
    start: u64,
}

impl<T: TimeSource> Stopwatch<T> {
    /// Start a stopwatch reading `source`.
    pub fn start(source: T) -> Self {
        let start = source.now_micros();
        Self { source, start }
    }

    /// Start a stopwatch as if it had been started at `now`, a reading taken
    /// from the same source.
    ///
    /// Lets two stopwatches start at exactly the same instant.
    pub fn start_at(source: T, now: u64) -> Self {
        Self { source, start: now }
    }

    /// Restart the measurement from the current instant.
    pub fn reset(&mut self) {
        self.start = self.source.now_micros();
    }

    /// Microseconds since construction or the last [`reset`](Self::reset).
    pub fn elapsed_micros(&self) -> u64 {
        self.source.now_micros().saturating_sub(self.start)
    }

    /// Microseconds between the stopwatch start and `now`, a reading taken
    /// earlier from the same source.
    ///
    /// Lets two stopwatches be stopped at exactly the same instant.
    pub fn elapsed_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.start)
    }

    /// The time source this stopwatch reads.
    pub fn source(&self) -> &T {
        &self.source
    }
}

/// Format a duration in microseconds as `H:MM:SS`.
///
/// Sub-second remainders are truncated, hours are not wrapped.
pub fn format_hms(micros: u64) -> String {
    let seconds = micros / 1_000_000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    format!("{hours}:{:02}:{:02}", minutes % 60, seconds % 60)
}
