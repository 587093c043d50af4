//! List the serial ports available on this system.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example list_ports
//! ```

use serial_core::list_ports;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match list_ports() {
        Ok(ports) => {
            if ports.is_empty() {
                println!("No serial ports detected on this system");
                return;
            }

            println!("Found {} serial port(s):", ports.len());
            for name in &ports {
                println!("  {name}");
            }
        }
        Err(err) => {
            eprintln!("Enumeration failed: {err}");
            std::process::exit(1);
        }
    }
}
