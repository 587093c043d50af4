//! Backend contract for native serial ports.
//!
//! The trait abstracts over the compiled platform backend and the mock,
//! allowing the orchestration layer in [`super::serial_port`] to be tested
//! without hardware.

use std::fmt;

use crate::config::PortConfig;
use crate::error::Result;

/// Largest byte count handed to a single native read or write attempt.
/// The orchestrator loops over anything bigger.
pub(crate) const MAX_NATIVE_IO: usize = i32::MAX as usize;

/// Which buffered direction a purge discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeKind {
    /// Received but not yet read.
    Rx,
    /// Written but not yet transmitted.
    Tx,
    /// Both directions.
    RxTx,
}

/// A single open native port.
///
/// Implementations own the OS resource exclusively and release it exactly
/// once: either through `close` or, as a backstop, on drop.
pub trait NativePort: Send + fmt::Debug {
    /// Apply the full line configuration atomically.
    fn configure(&mut self, config: &PortConfig) -> Result<()>;

    /// Bound how long a read may block waiting for the first byte.
    /// `0` disables the timeout.
    fn set_read_timeout(&mut self, millis: u32) -> Result<()>;

    /// One bounded read attempt. `Ok(0)` means the configured timeout
    /// expired with no data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// One bounded write attempt; partial writes are reported as-is.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Bytes buffered by the OS and ready to read.
    fn bytes_to_read(&mut self) -> Result<u32>;

    /// Discard buffered, not-yet-transferred bytes.
    fn purge(&mut self, kind: PurgeKind) -> Result<()>;

    /// Block until all pending output has been transmitted.
    fn flush(&mut self) -> Result<()>;

    /// Release the OS resource.
    fn close(&mut self) -> Result<()>;
}

#[cfg(unix)]
pub(crate) use super::posix::{enumerate, open};
#[cfg(windows)]
pub(crate) use super::windows::{enumerate, open};
