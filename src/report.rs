//! Final report of a run: console block and JSON export.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::clock::format_hms;
use crate::error::{Error, ErrorKind, Result};
use crate::stats::Aggregator;
use crate::transfer::{Direction, Observer};

/// Final numbers for one (direction, observer) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub direction: Direction,
    pub observer: Observer,
    pub samples: u64,
    pub max_mbps: f64,
    pub avg_mbps: f64,
    pub min_mbps: f64,
    pub stdev_pct: f64,
}

/// Everything a finished run reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub transfer_size: usize,
    pub iterations: usize,
    pub total_micros: u64,
    pub summaries: Vec<Summary>,
}

impl Report {
    /// Snapshot the aggregates. Pairs without samples report zeros.
    pub fn from_stats(
        stats: &Aggregator,
        transfer_size: usize,
        iterations: usize,
        total_micros: u64,
    ) -> Self {
        let mut summaries = Vec::with_capacity(4);
        for direction in Direction::ALL {
            for observer in Observer::ALL {
                let agg = stats.get(direction, observer);
                summaries.push(Summary {
                    direction,
                    observer,
                    samples: agg.count(),
                    max_mbps: agg.max(),
                    avg_mbps: agg.mean().unwrap_or(0.0),
                    min_mbps: agg.min(),
                    stdev_pct: agg.stdev_pct(),
                });
            }
        }
        Self {
            transfer_size,
            iterations,
            total_micros,
            summaries,
        }
    }

    pub fn summary(&self, direction: Direction, observer: Observer) -> Option<&Summary> {
        self.summaries
            .iter()
            .find(|s| s.direction == direction && s.observer == observer)
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| {
            Error::new(ErrorKind::SystemError, "failed to create report file")
                .with_operation("Report::write_json")
                .with_context("path", path.display().to_string())
                .set_source(e)
        })?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self).map_err(|e| {
            Error::new(ErrorKind::SystemError, "failed to serialize report")
                .with_operation("Report::write_json")
                .with_context("path", path.display().to_string())
                .set_source(e)
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for direction in Direction::ALL {
            let title = match direction {
                Direction::Write => "Write",
                Direction::Read => "Read",
            };
            writeln!(f, "\n{title} bandwidth achieved :")?;
            for (i, observer) in Observer::ALL.into_iter().enumerate() {
                let Some(s) = self.summary(direction, observer) else {
                    continue;
                };
                if i > 0 {
                    writeln!(f)?;
                }
                writeln!(
                    f,
                    "\t\tMax throughput from {observer}: {:.2} MB/s",
                    s.max_mbps
                )?;
                writeln!(
                    f,
                    "\t\tAverage throughput from {observer}: {:.2} MB/s  (\u{b1} {:.1}%, {} runs)",
                    s.avg_mbps, s.stdev_pct, s.samples
                )?;
            }
        }
        write!(f, "\nTotal time: {}", format_hms(self.total_micros))
    }
}
