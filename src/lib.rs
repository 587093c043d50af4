//! Cross-platform synchronous serial port access.
//!
//! This crate enumerates host serial (RS-232-class) ports, opens and
//! configures them, and performs timeout-bounded reads and blocking writes
//! with one error model on both supported platforms (POSIX termios and
//! Win32 COM).
//!
//! # Modules
//!
//! - `config`: abstract line configuration (baud, data bits, parity, stop bits)
//! - `error`: the shared error taxonomy
//! - `list`: growable list of bounded-length port names
//! - `port`: the port orchestration layer and the native backends
//!
//! # Example
//!
//! ```no_run
//! use serial_core::{list_ports, PortConfig, SerialPort};
//!
//! fn main() -> serial_core::Result<()> {
//!     for name in &list_ports()? {
//!         println!("{name}");
//!     }
//!
//!     let mut port = SerialPort::open("/dev/ttyUSB0")?;
//!     port.configure(&PortConfig {
//!         baud: 115_200,
//!         ..PortConfig::default()
//!     })?;
//!     port.set_read_timeout(1_000)?;
//!
//!     port.write(b"ping")?;
//!     let mut buf = [0u8; 64];
//!     let n = port.read(&mut buf)?;
//!     println!("got {n} bytes");
//!
//!     port.close()
//! }
//! ```
//!
//! # Concurrency
//!
//! Every operation is a direct blocking call on the invoking thread. Ports
//! are independent of each other, but a single port must be driven by one
//! logical owner at a time.

pub mod config;
pub mod error;
pub mod list;
pub mod port;

pub use config::{DataBits, Parity, PortConfig, StopBits, STANDARD_BAUD_RATES};
pub use error::{Result, SerialError};
pub use list::{PortList, MAX_PORT_NAME_LEN};
pub use port::{list_ports, list_ports_into, MockPort, NativePort, PurgeKind, SerialPort};

/// The crate version, as baked in at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
