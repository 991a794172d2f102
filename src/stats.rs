//! Running throughput statistics.
//!
//! One [`Aggregate`] per (direction, observer) pair. Aggregates only ever
//! grow: there is no reset, and nothing but [`Aggregator::record`] mutates
//! them.

use crate::transfer::{Direction, Observer, TransferResult};

/// Running statistics over a stream of throughput samples (MB/s).
///
/// The mean is the running sum over the count. The sum is kept with
/// Neumaier compensation so it stays accurate over arbitrarily many samples;
/// a separate Welford accumulator feeds the standard deviation only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregate {
    count: u64,
    sum: f64,
    compensation: f64,
    welford_mean: f64,
    m2: f64,
    max: f64,
    min: f64,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample.
    pub fn push(&mut self, sample: f64) {
        self.count += 1;

        let t = self.sum + sample;
        if self.sum.abs() >= sample.abs() {
            self.compensation += (self.sum - t) + sample;
        } else {
            self.compensation += (sample - t) + self.sum;
        }
        self.sum = t;

        let delta = sample - self.welford_mean;
        self.welford_mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.welford_mean);

        if self.count == 1 {
            self.max = sample;
            self.min = sample;
        } else {
            if sample > self.max {
                self.max = sample;
            }
            if sample < self.min {
                self.min = sample;
            }
        }
    }

    /// Number of samples recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Compensated sum of all samples.
    pub fn sum(&self) -> f64 {
        self.sum + self.compensation
    }

    /// Arithmetic mean (`sum / count`), `None` before the first sample.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum() / self.count as f64)
    }

    /// Largest sample seen; `0.0` before the first sample.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Smallest sample seen; `0.0` before the first sample.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Sample standard deviation, zero with fewer than two samples.
    pub fn stdev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    /// Standard deviation as a percentage of the mean.
    pub fn stdev_pct(&self) -> f64 {
        match self.mean() {
            Some(mean) if mean.abs() > 1e-15 => self.stdev() / mean * 100.0,
            _ => 0.0,
        }
    }
}

/// The four aggregates of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregator {
    write_host: Aggregate,
    write_device: Aggregate,
    read_host: Aggregate,
    read_device: Aggregate,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed transfer into the aggregates of its direction.
    pub fn record(&mut self, result: &TransferResult) {
        let (host, device) = match result.direction {
            Direction::Write => (&mut self.write_host, &mut self.write_device),
            Direction::Read => (&mut self.read_host, &mut self.read_device),
        };
        host.push(result.host_mbps);
        device.push(result.device_mbps);
    }

    pub fn get(&self, direction: Direction, observer: Observer) -> &Aggregate {
        match (direction, observer) {
            (Direction::Write, Observer::Host) => &self.write_host,
            (Direction::Write, Observer::Device) => &self.write_device,
            (Direction::Read, Observer::Host) => &self.read_host,
            (Direction::Read, Observer::Device) => &self.read_device,
        }
    }
}
