//! Write a probe to a port and print whatever comes back.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example echo -- /dev/ttyUSB0 115200
//! ```

use serial_core::{PortConfig, SerialPort};

fn main() -> serial_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| {
        eprintln!("usage: echo <port> [baud]");
        std::process::exit(2);
    });
    let baud: u32 = args
        .next()
        .map(|s| s.parse().expect("baud must be a number"))
        .unwrap_or(115_200);

    let mut port = SerialPort::open(&name)?;
    port.configure(&PortConfig {
        baud,
        ..PortConfig::default()
    })?;
    port.set_read_timeout(2_000)?;

    println!("Opened {} at {} baud", port.name(), baud);

    port.write(b"hello\n")?;
    println!("Wrote probe, waiting up to 2s for a response...");

    let mut buf = [0u8; 256];
    match port.read(&mut buf) {
        Ok(0) => println!("No data available"),
        Ok(n) => println!("Got {} byte(s): {:?}", n, String::from_utf8_lossy(&buf[..n])),
        Err(serial_core::SerialError::Timeout) => println!("Timed out with no response"),
        Err(err) => {
            port.close()?;
            return Err(err);
        }
    }

    port.close()
}
