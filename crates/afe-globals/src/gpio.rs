//! Naming of the MPSSE GPIO byte-ports.
//!
//! The low byte-port (ADBUS) carries the fixed SPI roles on bits 0..=3:
//!
//! | Bit | Role | Direction |
//! |-----|------|-----------|
//! | 0   | CLK  | output    |
//! | 1   | MOSI | output    |
//! | 2   | MISO | input     |
//! | 3   | CS0  | output    |
//!
//! Bits 4..=7 of the low port and all eight bits of the high byte-port (ACBUS)
//! are general purpose.

use crate::{Error, Result};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// One of the two 8-bit GPIO ports of an MPSSE channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// ADBUS, set with opcode `0x80`.
    Low,
    /// ACBUS, set with opcode `0x82`.
    High,
}

impl Port {
    pub fn prefix(&self) -> &'static str {
        match self {
            Port::Low => "AD",
            Port::High => "AC",
        }
    }
}

/// Bits of the low port reserved for the SPI engine.
pub const LOW_FIXED_MASK: u8 = 0x0F;
/// Fixed-role directions: CLK, MOSI and CS0 outputs, MISO input.
pub const LOW_FIXED_DIR: u8 = 0b1011;
/// Fixed-role idle levels: CLK low, MOSI low, CS0 high.
pub const LOW_FIXED_IDLE: u8 = 0b1000;

/// A single GPIO line of either byte-port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin {
    port: Port,
    bit: u8,
}

impl GpioPin {
    pub const CLK: GpioPin = GpioPin { port: Port::Low, bit: 0 };
    pub const MOSI: GpioPin = GpioPin { port: Port::Low, bit: 1 };
    pub const MISO: GpioPin = GpioPin { port: Port::Low, bit: 2 };
    pub const CS0: GpioPin = GpioPin { port: Port::Low, bit: 3 };
    /// Default buffer-enable line of the 3-wire read path.
    pub const AC0: GpioPin = GpioPin { port: Port::High, bit: 0 };

    /// A line of the low port (ADBUS). Only bits 3..=7 are free for GPIO use.
    pub fn ad(bit: u8) -> Result<Self> {
        if !(3..=7).contains(&bit) {
            return Err(Error::InvalidPin { port: Port::Low, bit });
        }
        Ok(Self { port: Port::Low, bit })
    }

    /// A line of the high port (ACBUS).
    pub fn ac(bit: u8) -> Result<Self> {
        if bit > 7 {
            return Err(Error::InvalidPin { port: Port::High, bit });
        }
        Ok(Self { port: Port::High, bit })
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn bit(&self) -> u8 {
        self.bit
    }

    pub fn mask(&self) -> u8 {
        1 << self.bit
    }

    /// Every line that may act as chip-select, trigger or buffer enable.
    pub fn selectable() -> impl Iterator<Item = GpioPin> {
        (3..=7)
            .map(|bit| GpioPin { port: Port::Low, bit })
            .chain((0..=7).map(|bit| GpioPin { port: Port::High, bit }))
    }
}

impl Display for GpioPin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.port.prefix(), self.bit)
    }
}

impl FromStr for GpioPin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let (port, digits) = if let Some(rest) = upper.strip_prefix("AD") {
            (Port::Low, rest)
        } else if let Some(rest) = upper.strip_prefix("AC") {
            (Port::High, rest)
        } else {
            return Err(Error::UnknownName(s.to_string()));
        };
        let bit = digits
            .parse::<u8>()
            .map_err(|_| Error::UnknownName(s.to_string()))?;
        match port {
            Port::Low => GpioPin::ad(bit),
            Port::High => GpioPin::ac(bit),
        }
    }
}
