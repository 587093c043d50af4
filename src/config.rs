//! Abstract, OS-independent port configuration.
//!
//! A `PortConfig` captures the line parameters (baud rate, data bits, parity,
//! stop bits) without any platform detail. Backends translate it into their
//! native control structures (`termios` / `DCB`).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SerialError};

/// Baud rates every backend accepts.
///
/// This is the classic termios table; rates outside it are rejected with
/// `InvalidParam` on every platform so that behavior stays uniform even where
/// the OS would take an arbitrary rate.
pub const STANDARD_BAUD_RATES: [u32; 30] = [
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115_200, 230_400, 460_800, 500_000, 576_000, 921_600, 1_000_000, 1_152_000, 1_500_000,
    2_000_000, 2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// The character size as a plain count.
    pub fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// Configuration parameters for a serial port.
///
/// Compared structurally so that re-applying the active configuration is
/// detectable as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Baud rate (bits per second). Must be one of [`STANDARD_BAUD_RATES`].
    pub baud: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,
}

impl Default for PortConfig {
    /// 9600 baud, 8 data bits, no parity, 1 stop bit.
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl PortConfig {
    /// Check every field against the supported set.
    ///
    /// The enum fields are closed by construction, so only the baud rate
    /// needs a runtime check.
    pub fn validate(&self) -> Result<()> {
        if !STANDARD_BAUD_RATES.contains(&self.baud) {
            return Err(SerialError::InvalidParam);
        }
        Ok(())
    }
}
