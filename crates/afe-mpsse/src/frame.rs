//! SPI frames of the bias DAC.
//!
//! ```text
//! byte 0      byte 1      byte 2..
//! R/W|addr14:8 addr7:0    data
//! ```
//!
//! R/W is 1 for reads. A read announces the address and then clocks one zero
//! byte per requested register; the answer starts at [`HEADER_LEN`].

use afe_globals::registers::ADDR_MAX;
use afe_globals::{Error, Result};

pub const READ_FLAG: u8 = 0x80;
pub const HEADER_LEN: usize = 2;

fn header(addr: u16, read: bool) -> Result<[u8; HEADER_LEN]> {
    if addr > ADDR_MAX {
        return Err(Error::AddressOverflow(addr));
    }
    let [hi, lo] = addr.to_be_bytes();
    let flag = if read { READ_FLAG } else { 0 };
    Ok([flag | (hi & 0x7F), lo])
}

/// Frame writing `data` starting at `addr`. The chip auto-increments the
/// address for every further byte.
pub fn write_frame(addr: u16, data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(Error::Argument("write needs at least one data byte"));
    }
    let mut frame = Vec::with_capacity(HEADER_LEN + data.len());
    frame.extend_from_slice(&header(addr, false)?);
    frame.extend_from_slice(data);
    Ok(frame)
}

/// Frame reading `len` consecutive registers starting at `addr`.
pub fn read_frame(addr: u16, len: usize) -> Result<Vec<u8>> {
    if len < 1 {
        return Err(Error::Argument("read length must be at least 1"));
    }
    let mut frame = vec![0u8; HEADER_LEN + len];
    frame[..HEADER_LEN].copy_from_slice(&header(addr, true)?);
    Ok(frame)
}

/// Useful part of the bytes clocked in during a read frame.
pub fn read_payload(response: &[u8]) -> &[u8] {
    response.get(HEADER_LEN..).unwrap_or(&[])
}

/// Split a frame into `(is_read, addr, payload)`.
pub fn parse_frame(frame: &[u8]) -> Result<(bool, u16, &[u8])> {
    if frame.len() < HEADER_LEN {
        return Err(Error::Argument("frame shorter than its header"));
    }
    let read = frame[0] & READ_FLAG != 0;
    let addr = u16::from_be_bytes([frame[0] & 0x7F, frame[1]]);
    Ok((read, addr, &frame[HEADER_LEN..]))
}
