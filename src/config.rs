//! Runtime configuration for a benchmark run.
//!
//! Values come from three layers, lowest precedence first: built-in defaults,
//! `P2PBENCH_*` environment variables ([`Config::from_env`]), and command-line
//! flags applied by the binary.
//!
//! # Environment Variables
//!
//! | Variable | Type | Default | Description |
//! |----------|------|---------|-------------|
//! | `P2PBENCH_TRANSFER_SIZE` | size | `2000000000` | Bytes moved per transfer |
//! | `P2PBENCH_ITERATIONS` | `usize` | `1000` | Write/read cycles |
//! | `P2PBENCH_FILE_PATH` | path | unset | Storage path (file or block device) |
//! | `P2PBENCH_DEVICE_INDEX` | `u32` | `0` | Accelerator index |
//! | `P2PBENCH_BANK` | `u32` | `1` | Device memory bank for the P2P buffer |
//! | `P2PBENCH_DIRECT_IO` | `bool` | `true` | Open storage with `O_DIRECT` |
//!
//! Sizes accept a plain byte count or a `KiB`/`MiB`/`GiB`/`KB`/`MB`/`GB` suffix.

use std::path::PathBuf;

use crate::align::{DIRECT_IO_ALIGNMENT, MAX_SINGLE_IO, is_aligned};
use crate::error::{Error, ErrorKind, Result};

/// Default transfer size: 500M `u32` words.
pub const DEFAULT_TRANSFER_SIZE: usize = 2_000_000_000;

/// Default number of write/read iterations.
pub const DEFAULT_ITERATIONS: usize = 1000;

/// Default memory bank for the peer-to-peer buffer.
pub const DEFAULT_BANK: u32 = 1;

/// Settings for one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bytes moved by every transfer; also the device buffer size.
    pub transfer_size: usize,
    /// Number of write/read iterations.
    pub iterations: usize,
    /// Storage path the transfers target.
    pub file_path: Option<PathBuf>,
    /// Accelerator index.
    pub device_index: u32,
    /// Device image to load before allocating the buffer.
    pub xclbin: Option<PathBuf>,
    /// Memory bank the peer-to-peer buffer is allocated in.
    pub bank: u32,
    /// Whether storage is opened with `O_DIRECT`.
    pub direct_io: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfer_size: DEFAULT_TRANSFER_SIZE,
            iterations: DEFAULT_ITERATIONS,
            file_path: None,
            device_index: 0,
            xclbin: None,
            bank: DEFAULT_BANK,
            direct_io: true,
        }
    }
}

impl Config {
    /// Create a configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(val) = env_var("P2PBENCH_TRANSFER_SIZE")? {
            config.transfer_size = parse_size(&val).map_err(|e| {
                e.with_operation("Config::from_env")
                    .with_context("env_var", "P2PBENCH_TRANSFER_SIZE")
            })?;
        }

        if let Some(val) = env_var("P2PBENCH_ITERATIONS")? {
            config.iterations = parse_num(&val, "P2PBENCH_ITERATIONS")?;
        }

        if let Some(val) = env_var("P2PBENCH_FILE_PATH")? {
            config.file_path = Some(PathBuf::from(val));
        }

        if let Some(val) = env_var("P2PBENCH_DEVICE_INDEX")? {
            config.device_index = parse_num(&val, "P2PBENCH_DEVICE_INDEX")?;
        }

        if let Some(val) = env_var("P2PBENCH_BANK")? {
            config.bank = parse_num(&val, "P2PBENCH_BANK")?;
        }

        if let Some(val) = env_var("P2PBENCH_DIRECT_IO")? {
            config.direct_io = parse_bool(&val, "P2PBENCH_DIRECT_IO")?;
        }

        Ok(config)
    }

    /// Check that the configuration describes a runnable benchmark.
    ///
    /// Sizes above the single-call I/O limit are accepted with a warning:
    /// the kernel will return short transfers, which the harness reports.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(invalid("iterations must be at least 1"));
        }
        match &self.file_path {
            None => return Err(invalid("a storage file path is required")),
            Some(p) if p.as_os_str().is_empty() => {
                return Err(invalid("the storage file path is empty"));
            }
            Some(_) => {}
        }
        if self.transfer_size == 0 {
            return Err(invalid("transfer size must be non-zero"));
        }
        if self.direct_io && !is_aligned(self.transfer_size, DIRECT_IO_ALIGNMENT) {
            return Err(invalid(format!(
                "transfer size {} is not a multiple of {DIRECT_IO_ALIGNMENT} bytes, \
                 required for direct I/O",
                self.transfer_size
            ))
            .with_context("transfer_size", self.transfer_size.to_string()));
        }
        if self.transfer_size > MAX_SINGLE_IO {
            tracing::warn!(
                transfer_size = self.transfer_size,
                limit = MAX_SINGLE_IO,
                "transfer size exceeds the single-call I/O limit; transfers will be short"
            );
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::ConfigInvalid, message).with_operation("Config::validate")
}

/// Read an environment variable, returning `None` if it is unset or empty.
fn env_var(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(Error::new(
            ErrorKind::ConfigInvalid,
            format!("environment variable {name} contains invalid Unicode"),
        )
        .with_operation("Config::from_env")
        .with_context("env_var", name)),
    }
}

fn parse_num<T>(val: &str, var_name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    val.trim().parse::<T>().map_err(|e| {
        Error::new(
            ErrorKind::ConfigInvalid,
            format!("invalid value for {var_name}: {val:?}"),
        )
        .with_operation("Config::from_env")
        .with_context("env_var", var_name)
        .set_source(e)
    })
}

fn parse_bool(val: &str, var_name: &str) -> Result<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(Error::new(
            ErrorKind::ConfigInvalid,
            format!("invalid boolean value for {var_name}: {val:?}"),
        )
        .with_operation("Config::from_env")
        .with_context("env_var", var_name)),
    }
}

/// Parse a size string like `"4KiB"`, `"16MiB"`, `"2GB"`, or a plain byte count.
pub fn parse_size(s: &str) -> Result<usize> {
    let s = s.trim();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GiB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1_000_000_000)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1_000_000)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1_000)
    } else {
        (s, 1)
    };
    let num: usize = num_str.trim().parse().map_err(|e| {
        Error::new(ErrorKind::ConfigInvalid, format!("invalid size {s:?}"))
            .with_operation("parse_size")
            .set_source(e)
    })?;
    num.checked_mul(multiplier).ok_or_else(|| {
        Error::new(ErrorKind::ConfigInvalid, format!("size {s:?} overflows usize"))
            .with_operation("parse_size")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable() -> Config {
        Config {
            file_path: Some(PathBuf::from("/mnt/smartssd/p2p.bin")),
            ..Config::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.transfer_size, 2_000_000_000);
        assert_eq!(config.iterations, 1000);
        assert_eq!(config.device_index, 0);
        assert_eq!(config.bank, 1);
        assert!(config.direct_io);
        assert!(config.file_path.is_none());
        assert!(config.xclbin.is_none());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("4KiB").unwrap(), 4096);
        assert_eq!(parse_size(" 16MiB ").unwrap(), 16 * 1024 * 1024);
        assert_eq!(parse_size("1GiB").unwrap(), 1 << 30);
        assert_eq!(parse_size("2GB").unwrap(), 2_000_000_000);
        assert_eq!(parse_size("500KB").unwrap(), 500_000);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert_eq!(parse_size("lots").unwrap_err().kind(), ErrorKind::ConfigInvalid);
        assert_eq!(parse_size("-4KiB").unwrap_err().kind(), ErrorKind::ConfigInvalid);
        let huge = format!("{}GiB", usize::MAX);
        assert_eq!(parse_size(&huge).unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_parse_bool() {
        for s in &["true", "ON", "Yes", "1", " true "] {
            assert!(parse_bool(s, "TEST").unwrap(), "expected true for {s:?}");
        }
        for s in &["false", "OFF", "no", "0"] {
            assert!(!parse_bool(s, "TEST").unwrap(), "expected false for {s:?}");
        }
        assert!(parse_bool("maybe", "TEST").is_err());
    }

    #[test]
    fn test_parse_num() {
        assert_eq!(parse_num::<usize>(" 12 ", "TEST").unwrap(), 12);
        let err = parse_num::<u32>("-3", "TEST_VAR").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert!(err.message().contains("TEST_VAR"));
    }

    #[test]
    fn test_validate_ok() {
        runnable().validate().unwrap();
    }

    #[test]
    fn test_validate_zero_iterations() {
        let config = Config {
            iterations: 0,
            ..runnable()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_validate_missing_or_empty_path() {
        let err = Config::default().validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let config = Config {
            file_path: Some(PathBuf::new()),
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_validate_direct_io_alignment() {
        let config = Config {
            transfer_size: 4000,
            ..runnable()
        };
        assert!(config.validate().is_err());

        // Buffered I/O has no length restriction.
        let config = Config {
            transfer_size: 4000,
            direct_io: false,
            ..runnable()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_oversized_transfer_is_accepted() {
        let config = Config {
            transfer_size: MAX_SINGLE_IO + 4096,
            ..runnable()
        };
        config.validate().unwrap();
    }
}
