//! Error types for p2pbench.
//!
//! # Design
//!
//! - [`ErrorKind`] categorizes *what* went wrong.
//! - [`Error`] carries the kind plus the failing call site and key/value
//!   context for diagnostics.
//!
//! Nothing in the benchmark retries, so there is no retry status: an error
//! either aborts the run or is logged and dropped by the caller.
//!
//! Errors are constructed via a fluent builder pattern:
//!
//! ```
//! use p2pbench::error::{Error, ErrorKind};
//!
//! let err = Error::new(ErrorKind::ReadFailed, "pread returned no data")
//!     .with_operation("read_transfer")
//!     .with_context("path", "/mnt/nvme/p2p.bin");
//! assert_eq!(err.kind(), ErrorKind::ReadFailed);
//! ```

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

/// A specialized `Result` type for p2pbench operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categorizes the type of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An unexpected/internal error that should not happen under normal conditions.
    Unexpected,
    /// The storage path does not exist.
    NotFound,
    /// Permission denied when opening the storage path or device.
    PermissionDenied,
    /// Invalid configuration or arguments.
    ConfigInvalid,
    /// A POSIX/system call failed.
    SystemError,
    /// The accelerator rejected an open, allocation, image load or sync.
    DeviceError,
    /// The positioned write of a transfer failed or came up short.
    WriteFailed,
    /// The positioned read of a transfer returned no data or failed.
    ReadFailed,
    /// The requested feature is not available in this build.
    Unsupported,
}

impl ErrorKind {
    /// Returns a static string label for this error kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::SystemError => "SystemError",
            ErrorKind::DeviceError => "DeviceError",
            ErrorKind::WriteFailed => "WriteFailed",
            ErrorKind::ReadFailed => "ReadFailed",
            ErrorKind::Unsupported => "Unsupported",
        }
    }

    /// Whether to capture a backtrace for this error kind.
    ///
    /// Only `Unexpected` errors get one; every other kind names its call site
    /// through [`Error::operation`].
    fn enable_backtrace(&self) -> bool {
        matches!(self, ErrorKind::Unexpected)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for p2pbench.
pub struct Error {
    kind: ErrorKind,
    message: String,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    backtrace: Option<Box<Backtrace>>,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            operation: "",
            context: Vec::new(),
            source: None,
            // Zero cost when `RUST_BACKTRACE` is not set.
            backtrace: kind
                .enable_backtrace()
                .then(Backtrace::capture)
                .filter(|bt| bt.status() == BacktraceStatus::Captured)
                .map(Box::new),
        }
    }

    /// Build an error from the calling thread's `errno`.
    ///
    /// `ENOENT` and `EACCES`/`EPERM` map to their own kinds; everything else
    /// becomes `fallback`.
    pub fn last_os_error(fallback: ErrorKind, what: &str) -> Self {
        let io_err = std::io::Error::last_os_error();
        let kind = match io_err.raw_os_error() {
            Some(libc::ENOENT) => ErrorKind::NotFound,
            Some(libc::EACCES) | Some(libc::EPERM) => ErrorKind::PermissionDenied,
            _ => fallback,
        };
        Error::new(kind, format!("{what} failed")).set_source(io_err)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the operation that caused this error.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Returns the human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the error context as key-value pairs.
    pub fn context_iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.context.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Set the operation that caused this error.
    ///
    /// If the error already has an operation, the previous one is pushed
    /// into context as `("called", previous_operation)`.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add a key-value context pair.
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the underlying source error.
    pub fn set_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the captured backtrace, if any.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            let mut d = f.debug_struct("Error");
            d.field("kind", &self.kind);
            d.field("message", &self.message);
            d.field("operation", &self.operation);
            d.field("context", &self.context);
            d.field("source", &self.source.as_ref().map(|s| s.to_string()));
            d.finish()
        } else {
            writeln!(f, "{} at {} => {}", self.kind, self.operation, self.message)?;
            if !self.context.is_empty() {
                writeln!(f)?;
                writeln!(f, "Context:")?;
                for (k, v) in &self.context {
                    writeln!(f, "   {k}: {v}")?;
                }
            }
            if let Some(source) = &self.source {
                writeln!(f)?;
                writeln!(f, "Source:")?;
                writeln!(f, "   {source}")?;
            }
            if let Some(backtrace) = &self.backtrace {
                writeln!(f)?;
                writeln!(f, "Backtrace:")?;
                writeln!(f, "{backtrace}")?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.operation)?;
        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}: {v}")?;
            }
            write!(f, " }}")?;
        }
        write!(f, " => {}", self.message)?;
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> std::io::Error {
        let kind = match err.kind() {
            ErrorKind::NotFound => std::io::ErrorKind::NotFound,
            ErrorKind::PermissionDenied => std::io::ErrorKind::PermissionDenied,
            ErrorKind::Unsupported => std::io::ErrorKind::Unsupported,
            ErrorKind::ConfigInvalid => std::io::ErrorKind::InvalidInput,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(format!("{}", ErrorKind::ReadFailed), "ReadFailed");
        assert_eq!(format!("{}", ErrorKind::DeviceError), "DeviceError");
        assert_eq!(ErrorKind::WriteFailed.as_str(), "WriteFailed");
    }

    #[test]
    fn test_error_new_defaults() {
        let err = Error::new(ErrorKind::NotFound, "no such device node");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.operation(), "");
        assert_eq!(err.message(), "no such device node");
        assert_eq!(err.context_iter().count(), 0);
    }

    #[test]
    fn test_error_operation_chaining() {
        let err = Error::new(ErrorKind::SystemError, "pwrite failed")
            .with_operation("DirectFile::write_at")
            .with_operation("write_transfer");

        assert_eq!(err.operation(), "write_transfer");
        let ctx: Vec<_> = err.context_iter().collect();
        assert_eq!(ctx, vec![("called", "DirectFile::write_at")]);
    }

    #[test]
    fn test_error_with_source() {
        let io_err = std::io::Error::from_raw_os_error(libc::EIO);
        let err = Error::new(ErrorKind::ReadFailed, "pread failed")
            .with_operation("read_transfer")
            .set_source(io_err);

        let source = StdError::source(&err).unwrap();
        assert!(!source.to_string().is_empty());
    }

    #[test]
    fn test_error_display_format() {
        let err = Error::new(ErrorKind::NotFound, "open failed")
            .with_operation("DirectStorage::open")
            .with_context("path", "/mnt/nvme/p2p.bin");

        let display = format!("{err}");
        assert!(display.starts_with("NotFound at DirectStorage::open"));
        assert!(display.contains("path: /mnt/nvme/p2p.bin"));
        assert!(display.ends_with("=> open failed"));
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::new(ErrorKind::DeviceError, "sync to device failed")
            .with_operation("XrtBuffer::sync_to_device")
            .with_context("bo", "3");

        let debug = format!("{err:?}");
        assert!(debug.contains("DeviceError at XrtBuffer::sync_to_device"));
        assert!(debug.contains("Context:"));
        assert!(debug.contains("bo: 3"));

        let alt = format!("{err:#?}");
        assert!(alt.contains("kind: DeviceError"));
    }

    #[test]
    fn test_no_backtrace_for_expected_kinds() {
        let err = Error::new(ErrorKind::ReadFailed, "short");
        assert!(err.backtrace().is_none());
    }

    #[test]
    fn test_into_io_error() {
        let err = Error::new(ErrorKind::ConfigInvalid, "iterations must be >= 1");
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::InvalidInput);

        let err = Error::new(ErrorKind::PermissionDenied, "open failed");
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::PermissionDenied);
    }
}
