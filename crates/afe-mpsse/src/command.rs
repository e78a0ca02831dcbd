use afe_globals::ftdi::mpsse::*;
use afe_globals::{Error, Port, Result};
use std::fmt::{Debug, Formatter};

/// Longest block a single clocking opcode can carry.
pub const CLOCK_BLOCK_MAX: usize = 0x1_0000;

/// An MPSSE command stream under construction.
///
/// Besides the raw bytes the builder counts how many bytes the engine will
/// return once the stream has been executed, so that the caller can drain the
/// receive queue exactly.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct MpsseCommand {
    buf: Vec<u8>,
    response_len: usize,
}

impl MpsseCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Number of bytes the engine answers with.
    pub fn response_len(&self) -> usize {
        self.response_len
    }

    pub fn set_bits(&mut self, port: Port, value: u8, dir: u8) -> &mut Self {
        let opcode = match port {
            Port::Low => SET_BITS_LOW,
            Port::High => SET_BITS_HIGH,
        };
        self.buf.extend_from_slice(&[opcode, value, dir]);
        self
    }

    pub fn set_low(&mut self, value: u8, dir: u8) -> &mut Self {
        self.set_bits(Port::Low, value, dir)
    }

    pub fn set_high(&mut self, value: u8, dir: u8) -> &mut Self {
        self.set_bits(Port::High, value, dir)
    }

    /// Sample the pins of `port`. Answers one byte.
    pub fn get_bits(&mut self, port: Port) -> &mut Self {
        let opcode = match port {
            Port::Low => GET_BITS_LOW,
            Port::High => GET_BITS_HIGH,
        };
        self.buf.push(opcode);
        self.response_len += 1;
        self
    }

    /// Clock `data` out on the falling edge, MSB first, and read the same
    /// number of bytes back.
    pub fn clock_bytes(&mut self, data: &[u8]) -> Result<&mut Self> {
        if data.is_empty() || data.len() > CLOCK_BLOCK_MAX {
            return Err(Error::Argument("clocked block must hold 1..=65536 bytes"));
        }
        let len = (data.len() - 1) as u16;
        self.buf.push(CLOCK_BYTES_INOUT);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(data);
        self.response_len += data.len();
        Ok(self)
    }

    pub fn divisor(&mut self, divisor: u16) -> &mut Self {
        self.buf.push(TCK_DIVISOR);
        self.buf.extend_from_slice(&divisor.to_le_bytes());
        self
    }

    pub fn loopback(&mut self, enable: bool) -> &mut Self {
        self.buf
            .push(if enable { LOOPBACK_START } else { LOOPBACK_END });
        self
    }

    pub fn divide_by_5(&mut self, enable: bool) -> &mut Self {
        self.buf.push(if enable { EN_DIV_5 } else { DIS_DIV_5 });
        self
    }

    pub fn adaptive_clocking(&mut self, enable: bool) -> &mut Self {
        self.buf
            .push(if enable { EN_ADAPTIVE } else { DIS_ADAPTIVE });
        self
    }

    pub fn three_phase_clocking(&mut self, enable: bool) -> &mut Self {
        self.buf
            .push(if enable { EN_3_PHASE } else { DIS_3_PHASE });
        self
    }

    /// Flush the engine's result buffer to the host.
    pub fn send_immediate(&mut self) -> &mut Self {
        self.buf.push(SEND_IMMEDIATE);
        self
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.response_len = 0;
    }
}

impl From<Vec<u8>> for MpsseCommand {
    /// Reuse an allocation. The previous contents are discarded.
    fn from(mut value: Vec<u8>) -> Self {
        value.clear();
        Self {
            buf: value,
            response_len: 0,
        }
    }
}

impl From<MpsseCommand> for Vec<u8> {
    fn from(value: MpsseCommand) -> Self {
        value.buf
    }
}

impl Debug for MpsseCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpsseCommand")
            .field("buf", &format_args!("{:02x?}", self.buf))
            .field("response_len", &self.response_len)
            .finish()
    }
}
