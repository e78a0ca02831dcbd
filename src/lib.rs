//! Gate-bias control for an RF power-amplifier test bench, based on [nusb].
//!
//! [nusb]: https://github.com/kevinmehall/nusb
//!
//! The bench drives a 12-bit, 8-channel bias DAC over SPI. SPI is synthesized by the
//! MPSSE engine of an FTDI FT2232H; the second channel of the same chip steers the
//! external level shifters that sit between the bridge and the DAC.
//!
//! ## Layers
//!
//! | Layer | Type | Module |
//! |---|---|---|
//! | USB-MPSSE transport | [`Mpsse`] | [`transport`] |
//! | SPI bridge | [`SpiBridge`] | [`spi`] |
//! | DAC register driver | [`AfeDac`] | [`hardware::afe_dac`] |
//! | Bias loop and power sequencing | [`Bench`] | [`board`] |
//!
//! Every call is synchronous and blocking. One [`Bench`] owns one cable.
//!
//! ## Usage overview
//!
//! ```no_run
//! use afe_bias::{Bench, BenchConfig};
//! use afe_globals::{DacChannel, DacRange};
//! use afe_mpsse::DacCode;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut bench = Bench::open(&BenchConfig::default())?;
//! bench.initialize(DacRange::Minus10To0)?;
//! bench.preload_gates(&[DacChannel::A0, DacChannel::A1], DacCode::new(0x599)?)?;
//! bench.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Examples
//! A demo program exercises the init sequence on real hardware:
//! ```bash
//! cargo run --package gate-bias
//! ```
//!
//! ## Developers
//! All layers below the bench talk to the FTDI chip through the [`FtdiPort`] trait. The
//! integration tests substitute a simulated FT2232H with a DAC attached, so none of them
//! need hardware. For debugging on a real bench, `RUST_LOG=afe_bias=trace` dumps every
//! MPSSE byte sent and received.

pub mod board;
pub mod daq;
pub mod hardware;
#[cfg(feature = "nusb")]
pub mod opener;
pub mod spi;
pub mod transport;
pub mod usb;

pub use board::bench::{
    BIAS_SCHEDULE, Bench, BenchConfig, BiasConfig, BiasOutcome, BiasStep, ClampPolicy,
    MAX_DAC_CODE, Slope, StepAction,
};
pub use daq::{PowerSequencer, VoltageMeter};
pub use hardware::afe_dac::{AfeDac, ChannelState, ChipIdentity, DacConfig};
#[cfg(feature = "nusb")]
pub use opener::Opener;
pub use spi::{ReadMode, SpiBridge, SpiConfig, SpiTransaction};
pub use transport::{DeviceSelector, Mpsse, TransportConfig};
pub use usb::FtdiPort;

pub use afe_globals::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error occurred.
    #[error("io")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "nusb")]
    #[error("nusb")]
    Nusb(#[from] nusb::Error),
    /// USB transfer error.
    #[cfg(feature = "nusb")]
    #[error("transfer")]
    Transfer(#[from] nusb::transfer::TransferError),
    /// No adapter matches the requested description or serial.
    #[error("not found")]
    NotFound,
    /// The matching adapter is claimed by somebody else.
    #[error("device in use")]
    InUse,
    /// The MPSSE engine did not echo a bad opcode.
    #[error("mpsse did not answer bad opcode {opcode:#04x}, got {response:02x?}")]
    MpsseInit {
        /// Opcode sent.
        opcode: u8,
        /// Bytes received instead of `[0xFA, opcode]`.
        response: Vec<u8>,
    },
    /// Receive queue length does not match the announced response length.
    #[error("protocol desync: expected {expected} bytes, got {actual}")]
    Desync { expected: usize, actual: usize },
    /// The device accepted fewer bytes than were sent.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    /// Read back after a write did not match.
    #[error("register {addr:#06x} verify failed: wrote {expected:02x?}, read {actual:02x?}")]
    RegisterVerify {
        addr: u16,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
    /// The DAC is present but does not answer identity reads.
    #[error("dac unresponsive")]
    Unresponsive,
    /// Invalid argument provided.
    #[error("{0}")]
    Argument(&'static str),
    /// Clock outside of 1 kHz..=30 MHz.
    #[error("clock {0} Hz out of range")]
    ClockOutOfRange(u32),
    /// The bias loop refused a code at or above the ceiling.
    #[error("safety clamp refused dac code {code}")]
    SafetyClamp { code: i32 },
    /// A USB transfer did not finish in time.
    #[error("timeout")]
    Timeout,
    /// Identifier or codec validation failed.
    #[error(transparent)]
    Codec(#[from] afe_globals::Error),
}

/// Result type for operations that may return an `Error`.
pub type Result<T> = std::result::Result<T, Error>;
