//! Command-line interface.
//!
//! Flags override the `P2PBENCH_*` environment layer, which overrides the
//! built-in defaults.

use std::path::PathBuf;

use clap::{ArgAction, CommandFactory, Parser};

use crate::config::{Config, parse_size};
use crate::error::Result;

/// Peer-to-peer throughput benchmark between an accelerator buffer and NVMe
/// storage.
///
/// Each iteration writes the whole device buffer to the storage path with
/// one direct write, then reads it back with one direct read, timing both
/// from the host's and the device's point of view.
#[derive(Parser, Debug, Default)]
#[command(name = "p2pbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Storage path to transfer to and from (file or block device).
    ///
    /// The path must already exist and be at least as large as the transfer.
    #[arg(short = 'p', long = "file-path", value_name = "PATH")]
    pub file_path: Option<PathBuf>,

    /// Number of write/read iterations.
    #[arg(short = 'i', long)]
    pub iterations: Option<usize>,

    /// Bytes per transfer, e.g. 4096, 64MiB, 2GB.
    #[arg(short = 's', long = "size", value_name = "SIZE", value_parser = size_arg)]
    pub transfer_size: Option<usize>,

    /// Accelerator index.
    #[arg(short = 'd', long = "device-id", value_name = "INDEX")]
    pub device_index: Option<u32>,

    /// Device image to load before allocating the buffer.
    #[arg(short = 'x', long = "xclbin-file", value_name = "FILE")]
    pub xclbin: Option<PathBuf>,

    /// Memory bank for the peer-to-peer buffer.
    #[arg(long)]
    pub bank: Option<u32>,

    /// Open storage without O_DIRECT (for tmpfs and similar).
    #[arg(long)]
    pub no_direct: bool,

    /// Also write the final report as JSON to this file.
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

fn size_arg(s: &str) -> std::result::Result<usize, String> {
    parse_size(s).map_err(|e| e.message().to_string())
}

impl Cli {
    /// Default log filter for the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Layer the flags over the environment configuration.
    pub fn into_config(self) -> Result<Config> {
        let config = Config::from_env()?;
        Ok(self.apply(config))
    }

    /// Rendered `--help` text.
    pub fn help_text() -> String {
        Self::command().render_help().to_string()
    }

    fn apply(self, mut config: Config) -> Config {
        if let Some(path) = self.file_path {
            config.file_path = Some(path);
        }
        if let Some(n) = self.iterations {
            config.iterations = n;
        }
        if let Some(size) = self.transfer_size {
            config.transfer_size = size;
        }
        if let Some(index) = self.device_index {
            config.device_index = index;
        }
        if let Some(xclbin) = self.xclbin {
            config.xclbin = Some(xclbin);
        }
        if let Some(bank) = self.bank {
            config.bank = bank;
        }
        if self.no_direct {
            config.direct_io = false;
        }
        config
    }
}

/// True when there is nothing to benchmark against, so usage should be shown
/// instead of a configuration error.
pub fn needs_help(config: &Config) -> bool {
    config
        .file_path
        .as_ref()
        .is_none_or(|path| path.as_os_str().is_empty())
}
