//! Platform-independent port orchestration.
//!
//! `SerialPort` owns one native handle plus the cached configuration and
//! read timeout, and layers whole-request semantics over the backend's
//! single-attempt primitives: reads aggregate partial results, writes are
//! all-or-nothing, and close runs a fixed cleanup sequence.

use tracing::{debug, trace, warn};

use super::native::{self, NativePort, PurgeKind};
use crate::config::PortConfig;
use crate::error::{Result, SerialError};
use crate::list::{PortList, MAX_PORT_NAME_LEN};

/// Read timeout applied on open: 0 disables the timeout.
const DEFAULT_READ_TIMEOUT_MS: u32 = 0;

/// An open serial port.
///
/// All operations are synchronous blocking calls on the invoking thread.
/// A port must be driven by one logical owner at a time; concurrent use of
/// the same port is not supported and must be serialized by the caller.
#[derive(Debug)]
pub struct SerialPort {
    native: Box<dyn NativePort>,
    name: String,
    config: PortConfig,
    read_timeout_ms: u32,
}

impl SerialPort {
    /// Open the named port and apply the default configuration
    /// (9600 8N1, read timeout disabled).
    pub fn open(name: &str) -> Result<Self> {
        if name.len() > MAX_PORT_NAME_LEN {
            return Err(SerialError::OutOfMemory);
        }

        let mut native = native::open(name)?;

        let config = PortConfig::default();
        let setup = native
            .configure(&config)
            .and_then(|()| native.set_read_timeout(DEFAULT_READ_TIMEOUT_MS));
        if let Err(err) = setup {
            // Roll back the half-opened handle; its own failure must not
            // mask the primary error.
            let _ = native.close();
            return Err(err);
        }

        debug!(port = name, "opened serial port");
        Ok(Self {
            native,
            name: name.to_owned(),
            config,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        })
    }

    /// Wrap an already-open backend. This is the dependency-injection seam
    /// used with [`super::MockPort`] in tests; the backend is assumed to
    /// carry the default configuration.
    pub fn from_native(native: Box<dyn NativePort>, name: &str) -> Self {
        Self {
            native,
            name: name.to_owned(),
            config: PortConfig::default(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }

    /// The name this port was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last successfully applied configuration.
    pub fn config(&self) -> PortConfig {
        self.config
    }

    /// The current read timeout in milliseconds (0 = disabled).
    pub fn read_timeout(&self) -> u32 {
        self.read_timeout_ms
    }

    /// Apply `config`, validating it first. Re-applying the active
    /// configuration is a no-op that never touches the backend. The cached
    /// configuration changes only after the backend accepts the new one.
    pub fn configure(&mut self, config: &PortConfig) -> Result<()> {
        if *config == self.config {
            return Ok(());
        }

        config.validate()?;
        self.native.configure(config)?;
        self.config = *config;

        debug!(port = %self.name, baud = config.baud, "reconfigured");
        Ok(())
    }

    /// Bound how long `read` blocks waiting for the first byte; 0 disables
    /// the timeout. Unchanged values never touch the backend.
    pub fn set_read_timeout(&mut self, millis: u32) -> Result<()> {
        if millis == self.read_timeout_ms {
            return Ok(());
        }

        self.native.set_read_timeout(millis)?;
        self.read_timeout_ms = millis;
        Ok(())
    }

    /// Read up to `buf.len()` bytes, aggregating partial backend reads.
    ///
    /// Returns the number of bytes read. A timeout or error that interrupts
    /// the loop after at least one byte arrived is swallowed and the partial
    /// count returned; with nothing read, an error is propagated and a
    /// timeout reported as [`SerialError::Timeout`] (or `Ok(0)` when the
    /// timeout is disabled and nothing is buffered).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0usize;
        while total < buf.len() {
            match self.native.read(&mut buf[total..]) {
                Ok(n) if n > 0 => total += n,
                outcome => return self.finish_read(total, outcome),
            }
        }
        Ok(total)
    }

    /// Read and discard up to `len` bytes through a one-byte scratch buffer,
    /// with the same partial-completion semantics as [`Self::read`].
    pub fn read_discard(&mut self, len: usize) -> Result<usize> {
        let mut scratch = [0u8; 1];
        let mut total = 0usize;
        while total < len {
            match self.native.read(&mut scratch) {
                Ok(n) if n > 0 => total += n,
                outcome => return self.finish_read(total, outcome),
            }
        }
        Ok(total)
    }

    /// Shared tail of the read aggregation loop: data already accumulated
    /// wins over a trailing error or timeout; an empty result reports the
    /// failure itself.
    fn finish_read(&self, total: usize, outcome: Result<usize>) -> Result<usize> {
        if total > 0 {
            if outcome.is_err() {
                trace!(port = %self.name, total, "read error after partial data, returning partial");
            }
            return Ok(total);
        }
        match outcome {
            Err(err) => Err(err),
            Ok(_) => {
                if self.read_timeout_ms > 0 {
                    Err(SerialError::Timeout)
                } else {
                    // Timeout disabled: nothing buffered right now.
                    Ok(0)
                }
            }
        }
    }

    /// Write all of `buf`, looping over partial backend writes.
    ///
    /// All-or-nothing: a backend attempt that writes nothing or fails aborts
    /// the call and no partial success is reported.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0usize;
        while written < buf.len() {
            match self.native.write(&buf[written..]) {
                Ok(n) if n > 0 => written += n,
                Ok(_) => return Err(SerialError::Io),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Bytes buffered by the OS and ready to read.
    pub fn bytes_to_read(&mut self) -> Result<u32> {
        self.native.bytes_to_read()
    }

    /// Discard buffered, not-yet-transferred bytes in the given direction.
    pub fn purge(&mut self, kind: PurgeKind) -> Result<()> {
        self.native.purge(kind)
    }

    /// Block until all pending output has been transmitted.
    pub fn flush(&mut self) -> Result<()> {
        self.native.flush()
    }

    /// Close the port: disable the read timeout, flush pending output, then
    /// release the native handle.
    ///
    /// All three steps are attempted even when an earlier one fails; the
    /// first failure is the one reported. The handle is released either way.
    pub fn close(mut self) -> Result<()> {
        let mut first_err = None;

        if let Err(err) = self.set_read_timeout(0) {
            warn!(port = %self.name, %err, "failed to reset timeout during close");
            first_err.get_or_insert(err);
        }
        if let Err(err) = self.native.flush() {
            warn!(port = %self.name, %err, "failed to flush during close");
            first_err.get_or_insert(err);
        }
        if let Err(err) = self.native.close() {
            warn!(port = %self.name, %err, "failed to release native handle");
            first_err.get_or_insert(err);
        }

        debug!(port = %self.name, "closed serial port");
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Enumerate available ports into `list`, reusing its allocated slots.
///
/// The list is cleared, refilled from the OS, and sorted lexicographically
/// (the OS offers no ordering guarantee).
pub fn list_ports_into(list: &mut PortList) -> Result<()> {
    list.clear();
    native::enumerate(list)?;
    list.sort();
    Ok(())
}

/// Enumerate available ports into a fresh list.
pub fn list_ports() -> Result<PortList> {
    let mut list = PortList::new();
    list_ports_into(&mut list)?;
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataBits, Parity, StopBits};
    use crate::port::mock::{MockPort, WriteStep};
    use pretty_assertions::assert_eq;

    fn mock_port() -> (MockPort, SerialPort) {
        let mock = MockPort::new();
        let port = SerialPort::from_native(Box::new(mock.clone()), "MOCK0");
        (mock, port)
    }

    #[test]
    fn test_configure_noop_skips_backend() {
        let (mock, mut port) = mock_port();

        // Re-applying the default configuration never reaches the backend.
        port.configure(&PortConfig::default()).unwrap();
        assert_eq!(mock.configure_calls(), 0);

        let new_config = PortConfig {
            baud: 115_200,
            ..PortConfig::default()
        };
        port.configure(&new_config).unwrap();
        assert_eq!(mock.configure_calls(), 1);
        assert_eq!(port.config(), new_config);

        port.configure(&new_config).unwrap();
        assert_eq!(mock.configure_calls(), 1);
    }

    #[test]
    fn test_configure_invalid_baud_leaves_cache() {
        let (mock, mut port) = mock_port();
        let before = port.config();

        let bad = PortConfig {
            baud: 1234,
            ..PortConfig::default()
        };
        assert_eq!(port.configure(&bad).unwrap_err(), SerialError::InvalidParam);
        assert_eq!(port.config(), before);
        assert_eq!(mock.configure_calls(), 0);
    }

    #[test]
    fn test_configure_backend_failure_leaves_cache() {
        let (mock, mut port) = mock_port();
        let before = port.config();
        mock.fail_configure(SerialError::Io);

        let new_config = PortConfig {
            baud: 19_200,
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::Two,
        };
        assert_eq!(port.configure(&new_config).unwrap_err(), SerialError::Io);
        assert_eq!(port.config(), before);
    }

    #[test]
    fn test_set_read_timeout_noop() {
        let (mock, mut port) = mock_port();

        port.set_read_timeout(0).unwrap();
        assert_eq!(mock.set_timeout_calls(), 0);

        port.set_read_timeout(500).unwrap();
        port.set_read_timeout(500).unwrap();
        assert_eq!(mock.set_timeout_calls(), 1);
        assert_eq!(port.read_timeout(), 500);
    }

    #[test]
    fn test_read_aggregates_chunks() {
        let (mock, mut port) = mock_port();
        mock.enqueue_read(b"abc");
        mock.enqueue_read(b"defgh");

        let mut buf = [0u8; 8];
        assert_eq!(port.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn test_partial_read_swallows_timeout() {
        let (mock, mut port) = mock_port();
        port.set_read_timeout(500).unwrap();
        mock.enqueue_read(b"abc");
        mock.enqueue_read_timeout();

        let mut buf = [0u8; 10];
        assert_eq!(port.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_partial_read_swallows_error() {
        let (mock, mut port) = mock_port();
        mock.enqueue_read(b"xy");
        mock.enqueue_read_error(SerialError::Io);

        let mut buf = [0u8; 10];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
    }

    #[test]
    fn test_empty_read_propagates_error() {
        let (mock, mut port) = mock_port();
        mock.enqueue_read_error(SerialError::Io);

        let mut buf = [0u8; 10];
        assert_eq!(port.read(&mut buf).unwrap_err(), SerialError::Io);
    }

    #[test]
    fn test_empty_read_timeout_with_timeout_armed() {
        let (_mock, mut port) = mock_port();
        port.set_read_timeout(500).unwrap();

        let mut buf = [0u8; 10];
        assert_eq!(port.read(&mut buf).unwrap_err(), SerialError::Timeout);
    }

    #[test]
    fn test_empty_read_ok_with_timeout_disabled() {
        let (_mock, mut port) = mock_port();

        let mut buf = [0u8; 10];
        assert_eq!(port.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_discard() {
        let (mock, mut port) = mock_port();
        port.set_read_timeout(100).unwrap();
        mock.enqueue_read(b"abc");
        mock.enqueue_read_timeout();

        assert_eq!(port.read_discard(5).unwrap(), 3);
    }

    #[test]
    fn test_write_loops_over_partial_writes() {
        let (mock, mut port) = mock_port();
        mock.enqueue_write(WriteStep::Accept(4));
        mock.enqueue_write(WriteStep::Accept(100));

        port.write(b"0123456789").unwrap();

        let log = mock.write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], b"0123");
        assert_eq!(log[1], b"456789");
    }

    #[test]
    fn test_write_is_all_or_nothing() {
        let (mock, mut port) = mock_port();
        mock.enqueue_write(WriteStep::Accept(5));
        mock.enqueue_write(WriteStep::Fail(SerialError::Io));

        assert_eq!(port.write(b"0123456789").unwrap_err(), SerialError::Io);
    }

    #[test]
    fn test_write_zero_progress_is_io_error() {
        let (mock, mut port) = mock_port();
        mock.enqueue_write(WriteStep::Accept(0));

        assert_eq!(port.write(b"abc").unwrap_err(), SerialError::Io);
    }

    #[test]
    fn test_close_resets_timeout_then_flushes_then_releases() {
        let (mock, mut port) = mock_port();
        port.set_read_timeout(500).unwrap();

        port.close().unwrap();

        assert_eq!(mock.read_timeout_ms(), 0);
        assert_eq!(mock.flush_calls(), 1);
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_close_always_reaches_native_release() {
        let (mock, port) = mock_port();
        mock.fail_flush(SerialError::Io);

        assert_eq!(port.close().unwrap_err(), SerialError::Io);
        assert_eq!(mock.flush_calls(), 1);
        assert_eq!(mock.close_calls(), 1);
    }

    #[test]
    fn test_close_reports_first_error() {
        let (mock, port) = mock_port();
        mock.fail_flush(SerialError::Io);
        mock.fail_close(SerialError::NotFound);

        // The flush failure came first; the close failure must not mask it.
        assert_eq!(port.close().unwrap_err(), SerialError::Io);
    }

    #[test]
    fn test_open_rejects_overlong_name() {
        let long = "x".repeat(MAX_PORT_NAME_LEN + 1);
        assert_eq!(
            SerialPort::open(&long).unwrap_err(),
            SerialError::OutOfMemory
        );
    }

    #[test]
    fn test_accessors() {
        let (_mock, port) = mock_port();
        assert_eq!(port.name(), "MOCK0");
        assert_eq!(port.config(), PortConfig::default());
        assert_eq!(port.read_timeout(), 0);
    }
}
