//! Constants and typed identifiers shared by the `afe-bias` crates.
//!
//! Nothing in here performs I/O. The FTDI protocol constants live in [`ftdi`],
//! the GPIO pin naming of the MPSSE byte-ports in [`gpio`] and the register map
//! of the bias DAC in [`registers`].

pub mod ftdi;
pub mod gpio;
pub mod registers;

pub use gpio::{GpioPin, Port};
pub use registers::{DacChannel, DacGroup, DacRange, Register};

use std::time::Duration;

#[macro_export]
macro_rules! khz {
    ($value:expr) => {
        ($value * 1000u32)
    };
}

#[macro_export]
macro_rules! mhz {
    ($value:expr) => {
        ($value * 1000000u32)
    };
}

/// Errors raised while validating identifiers or encoding frames.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// A GPIO bit outside of the usable range of its byte-port.
    #[error("invalid pin {port:?}{bit}")]
    InvalidPin { port: Port, bit: u8 },
    /// A register address that does not fit into 15 bits.
    #[error("register address {0:#06x} exceeds 15 bits")]
    AddressOverflow(u16),
    /// A DAC code that does not fit into 12 bits.
    #[error("dac code {0:#06x} exceeds 12 bits")]
    CodeOverflow(u16),
    /// A symbolic name that is not part of the register map.
    #[error("unknown name \"{0}\"")]
    UnknownName(String),
    /// Invalid argument provided.
    #[error("{0}")]
    Argument(&'static str),
}

/// Result type for operations that may return an `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Default per-I/O timeout for reads and writes on one FTDI channel.
pub const IO_TIMEOUT: Duration = Duration::from_millis(50);

/// Settling time after a `REG_UPDATE` strobe before the outputs may be measured.
pub const SETTLE_TIME: Duration = Duration::from_millis(100);

/// Time the DAC needs to come back after a soft reset.
pub const SOFT_RESET_TIME: Duration = Duration::from_secs(1);

/// Maximum number of receive-queue polls per SPI transaction.
pub const QUEUE_POLL_LIMIT: usize = 10_000;
