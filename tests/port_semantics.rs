//! Behavioral tests for the public port API, driven by the mock backend.
//!
//! Covers the whole-request semantics the orchestration layer guarantees on
//! every platform: partial reads succeed, writes are all-or-nothing,
//! timeouts surface only when armed, reconfiguration is idempotent, and
//! close always releases the native handle.

use pretty_assertions::assert_eq;
use serial_core::port::mock::WriteStep;
use serial_core::{
    DataBits, MockPort, Parity, PortConfig, PurgeKind, SerialError, SerialPort, StopBits,
};

fn mock_port(name: &str) -> (MockPort, SerialPort) {
    let mock = MockPort::new();
    let port = SerialPort::from_native(Box::new(mock.clone()), name);
    (mock, port)
}

#[test]
fn read_returns_partial_data_instead_of_timeout() {
    let (mock, mut port) = mock_port("MOCK0");
    port.set_read_timeout(1_000).unwrap();

    // 3 bytes arrive, then the line goes quiet on a 10-byte request.
    mock.enqueue_read(b"abc");
    mock.enqueue_read_timeout();

    let mut buf = [0u8; 10];
    let n = port.read(&mut buf).unwrap();

    assert_eq!(n, 3);
    assert_eq!(&buf[..n], b"abc");
}

#[test]
fn read_with_armed_timeout_and_no_data_times_out() {
    let (_mock, mut port) = mock_port("MOCK0");
    port.set_read_timeout(1_000).unwrap();

    let mut buf = [0u8; 10];
    assert_eq!(port.read(&mut buf).unwrap_err(), SerialError::Timeout);
}

#[test]
fn read_with_disabled_timeout_and_no_data_is_empty_success() {
    let (_mock, mut port) = mock_port("MOCK0");

    let mut buf = [0u8; 10];
    assert_eq!(port.read(&mut buf).unwrap(), 0);
}

#[test]
fn write_reports_error_instead_of_partial_success() {
    let (mock, mut port) = mock_port("MOCK0");

    // 5 of 10 bytes go out, then the device errors.
    mock.enqueue_write(WriteStep::Accept(5));
    mock.enqueue_write(WriteStep::Fail(SerialError::Io));

    assert_eq!(port.write(b"0123456789").unwrap_err(), SerialError::Io);
}

#[test]
fn write_retries_until_everything_is_out() {
    let (mock, mut port) = mock_port("MOCK0");

    mock.enqueue_write(WriteStep::Accept(3));
    mock.enqueue_write(WriteStep::Accept(3));
    mock.enqueue_write(WriteStep::Accept(4));

    port.write(b"0123456789").unwrap();

    let written: Vec<u8> = mock.write_log().concat();
    assert_eq!(written, b"0123456789");
}

#[test]
fn reconfigure_roundtrip_and_noop() {
    let (mock, mut port) = mock_port("MOCK0");

    let config = PortConfig {
        baud: 115_200,
        data_bits: DataBits::Seven,
        parity: Parity::Odd,
        stop_bits: StopBits::Two,
    };

    port.configure(&config).unwrap();
    assert_eq!(port.config(), config);
    assert_eq!(mock.applied_config(), Some(config));
    assert_eq!(mock.configure_calls(), 1);

    // Structurally equal configuration: success without touching the backend.
    port.configure(&config).unwrap();
    assert_eq!(mock.configure_calls(), 1);
}

#[test]
fn reconfigure_roundtrip_over_all_legal_combinations() {
    let (mock, mut port) = mock_port("MOCK0");

    let data_bits = [DataBits::Five, DataBits::Six, DataBits::Seven, DataBits::Eight];
    let parities = [Parity::None, Parity::Even, Parity::Odd];
    let stop_bits = [StopBits::One, StopBits::OnePointFive, StopBits::Two];

    let mut applied = 0;
    for baud in [9600, 115_200] {
        for bits in data_bits {
            for parity in parities {
                for stop in stop_bits {
                    let config = PortConfig {
                        baud,
                        data_bits: bits,
                        parity,
                        stop_bits: stop,
                    };
                    port.configure(&config).unwrap();
                    applied += 1;

                    // Reading back returns the identical structure.
                    assert_eq!(port.config(), config);
                    assert_eq!(mock.applied_config(), Some(config));
                }
            }
        }
    }

    // Every combination differed from the previous one, so each reached
    // the backend exactly once.
    assert_eq!(mock.configure_calls(), applied);
}

#[test]
fn reconfigure_with_unsupported_baud_keeps_active_config() {
    let (mock, mut port) = mock_port("MOCK0");

    let good = PortConfig {
        baud: 19_200,
        ..PortConfig::default()
    };
    port.configure(&good).unwrap();

    let bad = PortConfig {
        baud: 1234,
        ..good
    };
    assert_eq!(port.configure(&bad).unwrap_err(), SerialError::InvalidParam);
    assert_eq!(port.config(), good);
    assert_eq!(mock.configure_calls(), 1);
}

#[test]
fn purge_is_forwarded_per_direction() {
    let (mock, mut port) = mock_port("MOCK0");

    port.purge(PurgeKind::Tx).unwrap();
    port.purge(PurgeKind::RxTx).unwrap();

    assert_eq!(mock.purge_calls(), vec![PurgeKind::Tx, PurgeKind::RxTx]);
}

#[test]
fn available_reflects_pending_input() {
    let (mock, mut port) = mock_port("MOCK0");

    mock.enqueue_read(b"pending");
    assert_eq!(port.bytes_to_read().unwrap(), 7);

    port.purge(PurgeKind::Rx).unwrap();
    assert_eq!(port.bytes_to_read().unwrap(), 0);
}

#[test]
fn close_sequence_survives_flush_failure() {
    let (mock, mut port) = mock_port("MOCK0");
    port.set_read_timeout(500).unwrap();
    mock.fail_flush(SerialError::Io);

    // The flush failure is reported, but the timeout was still reset and the
    // native handle still released.
    assert_eq!(port.close().unwrap_err(), SerialError::Io);
    assert_eq!(mock.read_timeout_ms(), 0);
    assert_eq!(mock.close_calls(), 1);
}

#[test]
fn version_is_exposed() {
    assert_eq!(serial_core::version(), env!("CARGO_PKG_VERSION"));
}

/// Smoke test against the real backend: enumeration must not fail on a
/// healthy system, whatever it finds.
#[cfg(unix)]
#[test]
fn enumeration_smoke() {
    let list = serial_core::list_ports().unwrap();

    // Whatever was found is sorted ascending.
    let names: Vec<&str> = list.iter().collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}
