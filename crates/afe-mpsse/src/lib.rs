//! I/O free encoders for the MPSSE command language and the bias DAC wire format.
//!
//! Everything in this crate produces or inspects plain byte buffers. Sending the
//! bytes over USB is the job of the `afe-bias` transport.

pub mod clock;
pub mod code;
pub mod command;
pub mod frame;
pub mod spi;

pub use clock::clock_divisor;
pub use code::{DacCode, encode_unipolar};
pub use command::MpsseCommand;
pub use frame::{read_frame, write_frame};
pub use spi::{Line, PortState, SpiLayout};
