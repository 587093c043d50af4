//! Shared error taxonomy for serial port operations.
//!
//! Every failure in this crate is reported as one of the closed set of
//! `SerialError` variants. Platform backends translate OS failures into the
//! taxonomy at the point of occurrence; no native error code crosses the
//! public API.

use thiserror::Error;

/// Convenient `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SerialError>;

/// Errors that can occur during serial port operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerialError {
    /// A failure that does not fit any other variant.
    #[error("unknown error")]
    Unknown,

    /// Allocation failed, or a name exceeded its fixed storage bound.
    #[error("out of memory")]
    OutOfMemory,

    /// A native I/O operation failed.
    #[error("I/O error")]
    Io,

    /// The device exists but may not be accessed (e.g. claimed by another
    /// process, or insufficient permissions).
    #[error("access denied")]
    AccessDenied,

    /// The named device is not present on the system.
    #[error("port not found")]
    NotFound,

    /// A parameter is outside the supported set (e.g. a non-standard baud
    /// rate, or an out-of-range list index).
    #[error("invalid parameter")]
    InvalidParam,

    /// A read timed out before any data arrived.
    #[error("operation timed out")]
    Timeout,
}

impl SerialError {
    /// Translate an `std::io::ErrorKind` into the taxonomy.
    ///
    /// Used by the backends when a syscall failure carries a meaningful OS
    /// error; anything without a specific mapping collapses to `Io`.
    pub(crate) fn from_io_kind(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;

        match kind {
            ErrorKind::PermissionDenied => Self::AccessDenied,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::OutOfMemory => Self::OutOfMemory,
            ErrorKind::InvalidInput => Self::InvalidParam,
            ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io,
        }
    }
}

impl From<std::io::Error> for SerialError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_kind(err.kind())
    }
}
