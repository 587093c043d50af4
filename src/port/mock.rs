//! Mock backend for testing.
//!
//! `MockPort` simulates a native port without hardware: reads follow a
//! scripted sequence of outcomes, writes can be truncated or made to fail,
//! and every control call is counted so tests can assert on orchestration
//! behavior (no-op detection, cleanup ordering).
//!
//! The handle is cloneable; clones share state, so a test can keep one half
//! while the other is owned by a [`super::SerialPort`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::native::{NativePort, PurgeKind};
use crate::config::PortConfig;
use crate::error::{Result, SerialError};

/// Outcome of one scripted native read attempt.
#[derive(Debug, Clone)]
pub enum ReadStep {
    /// Deliver these bytes (split across attempts if the buffer is smaller).
    Data(Vec<u8>),
    /// The native timeout slice expired with no data (`Ok(0)`).
    TimedOut,
    /// The attempt failed.
    Fail(SerialError),
}

/// Outcome of one scripted native write attempt.
#[derive(Debug, Clone)]
pub enum WriteStep {
    /// Accept at most this many bytes.
    Accept(usize),
    /// The attempt failed.
    Fail(SerialError),
}

#[derive(Debug, Default)]
struct MockState {
    read_script: VecDeque<ReadStep>,
    write_script: VecDeque<WriteStep>,
    write_log: Vec<Vec<u8>>,

    applied_config: Option<PortConfig>,
    read_timeout_ms: u32,

    configure_calls: usize,
    set_timeout_calls: usize,
    flush_calls: usize,
    close_calls: usize,
    purge_calls: Vec<PurgeKind>,

    fail_configure: Option<SerialError>,
    fail_set_timeout: Option<SerialError>,
    fail_flush: Option<SerialError>,
    fail_close: Option<SerialError>,
}

/// Scriptable in-memory implementation of [`NativePort`].
#[derive(Debug, Clone, Default)]
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    /// Script a read attempt that delivers `data`.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state().read_script.push_back(ReadStep::Data(data.to_vec()));
    }

    /// Script a read attempt that times out with no data.
    pub fn enqueue_read_timeout(&self) {
        self.state().read_script.push_back(ReadStep::TimedOut);
    }

    /// Script a read attempt that fails.
    pub fn enqueue_read_error(&self, err: SerialError) {
        self.state().read_script.push_back(ReadStep::Fail(err));
    }

    /// Script the outcome of the next write attempt. Unscripted writes
    /// accept everything.
    pub fn enqueue_write(&self, step: WriteStep) {
        self.state().write_script.push_back(step);
    }

    /// All data accepted by write attempts, one entry per attempt.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state().write_log.clone()
    }

    /// Configuration most recently applied through `configure`.
    pub fn applied_config(&self) -> Option<PortConfig> {
        self.state().applied_config
    }

    /// Timeout most recently applied through `set_read_timeout`.
    pub fn read_timeout_ms(&self) -> u32 {
        self.state().read_timeout_ms
    }

    pub fn configure_calls(&self) -> usize {
        self.state().configure_calls
    }

    pub fn set_timeout_calls(&self) -> usize {
        self.state().set_timeout_calls
    }

    pub fn flush_calls(&self) -> usize {
        self.state().flush_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state().close_calls
    }

    pub fn purge_calls(&self) -> Vec<PurgeKind> {
        self.state().purge_calls.clone()
    }

    /// Make subsequent `configure` calls fail.
    pub fn fail_configure(&self, err: SerialError) {
        self.state().fail_configure = Some(err);
    }

    /// Make subsequent `set_read_timeout` calls fail.
    pub fn fail_set_timeout(&self, err: SerialError) {
        self.state().fail_set_timeout = Some(err);
    }

    /// Make subsequent `flush` calls fail.
    pub fn fail_flush(&self, err: SerialError) {
        self.state().fail_flush = Some(err);
    }

    /// Make subsequent `close` calls fail.
    pub fn fail_close(&self, err: SerialError) {
        self.state().fail_close = Some(err);
    }
}

impl NativePort for MockPort {
    fn configure(&mut self, config: &PortConfig) -> Result<()> {
        let mut state = self.state();
        state.configure_calls += 1;
        if let Some(err) = state.fail_configure {
            return Err(err);
        }
        state.applied_config = Some(*config);
        Ok(())
    }

    fn set_read_timeout(&mut self, millis: u32) -> Result<()> {
        let mut state = self.state();
        state.set_timeout_calls += 1;
        if let Some(err) = state.fail_set_timeout {
            return Err(err);
        }
        state.read_timeout_ms = millis;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state();
        match state.read_script.pop_front() {
            Some(ReadStep::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                // Leftover goes back to the front for the next attempt.
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    state.read_script.push_front(ReadStep::Data(rest));
                }
                Ok(n)
            }
            Some(ReadStep::TimedOut) | None => Ok(0),
            Some(ReadStep::Fail(err)) => Err(err),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state();
        match state.write_script.pop_front() {
            Some(WriteStep::Accept(limit)) => {
                let n = buf.len().min(limit);
                state.write_log.push(buf[..n].to_vec());
                Ok(n)
            }
            Some(WriteStep::Fail(err)) => Err(err),
            None => {
                state.write_log.push(buf.to_vec());
                Ok(buf.len())
            }
        }
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        let state = self.state();
        let pending: usize = state
            .read_script
            .iter()
            .map(|step| match step {
                ReadStep::Data(bytes) => bytes.len(),
                _ => 0,
            })
            .sum();
        Ok(pending as u32)
    }

    fn purge(&mut self, kind: PurgeKind) -> Result<()> {
        let mut state = self.state();
        state.purge_calls.push(kind);
        if matches!(kind, PurgeKind::Rx | PurgeKind::RxTx) {
            state.read_script.clear();
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.state();
        state.flush_calls += 1;
        if let Some(err) = state.fail_flush {
            return Err(err);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.close_calls += 1;
        if let Some(err) = state.fail_close {
            return Err(err);
        }
        Ok(())
    }
}
