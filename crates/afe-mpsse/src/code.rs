use afe_globals::registers::CODE_MAX;
use afe_globals::{Error, Result};
use std::fmt::{Display, Formatter};

/// A 12-bit DAC code.
///
/// On the wire a code occupies a low/high data register pair: the low register
/// holds bits 7..0, the high register bits 11..8 in its lower nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DacCode(u16);

impl DacCode {
    pub const ZERO: DacCode = DacCode(0);
    pub const MAX: DacCode = DacCode(CODE_MAX);

    pub fn new(code: u16) -> Result<Self> {
        if code > CODE_MAX {
            return Err(Error::CodeOverflow(code));
        }
        Ok(Self(code))
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        [(self.0 & 0xFF) as u8, ((self.0 >> 8) & 0x0F) as u8]
    }

    /// Reassemble a code from a register pair. Upper nibble bits of the high
    /// register are ignored.
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from(bytes[0]) | (u16::from(bytes[1] & 0x0F) << 8))
    }

    /// Byte image of consecutive data register pairs holding `codes`.
    pub fn pack(codes: &[DacCode]) -> Vec<u8> {
        codes.iter().flat_map(|code| code.to_bytes()).collect()
    }

    /// Inverse of [`DacCode::pack`]. A trailing odd byte is rejected.
    pub fn unpack(bytes: &[u8]) -> Result<Vec<DacCode>> {
        if bytes.len() % 2 != 0 {
            return Err(Error::Argument("dac data must come in register pairs"));
        }
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| DacCode::from_bytes([pair[0], pair[1]]))
            .collect())
    }
}

impl TryFrom<u16> for DacCode {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        DacCode::new(code)
    }
}

impl From<DacCode> for u16 {
    fn from(code: DacCode) -> Self {
        code.0
    }
}

impl Display for DacCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#05x}", self.0)
    }
}

/// Data register image for `volts` in the unipolar 0 V to +5 V range.
///
/// The 12-bit code `floor(volts * 4095 / 5)` is left-justified in a 16-bit word
/// and emitted high byte first, e.g. 5.0 V gives `[0xFF, 0xF0]`.
pub fn encode_unipolar(volts: f64) -> Result<[u8; 2]> {
    if !(0.0..=5.0).contains(&volts) {
        return Err(Error::Argument("unipolar voltage must be within 0..=5 V"));
    }
    let code = (volts * f64::from(CODE_MAX) / 5.0).floor() as u16;
    Ok((code.min(CODE_MAX) << 4).to_be_bytes())
}
