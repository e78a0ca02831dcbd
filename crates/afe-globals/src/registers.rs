//! Register map of the 12-bit, 8-channel bias DAC.
//!
//! Registers are 8 bits wide and addressed with 15 bits. DAC data registers come
//! in low/high pairs starting at `DACA0_DATA_LO` (0x50); the low register holds
//! code bits 7..0, the high register code bits 11..8.
//!
//! Range codes are 3-bit fields kept in the nibbles of `DAC_RNG0` (group A) and
//! `DAC_RNG1` (group B); neighbouring channels share a nibble:
//!
//! | Register  | Bits 3..0 | Bits 7..4 |
//! |-----------|-----------|-----------|
//! | DAC_RNG0  | A0, A1    | A2, A3    |
//! | DAC_RNG1  | B0, B1    | B2, B3    |
//!
//! Power enables live in `DAC_PD0`, bit n powering channel n in `A0..B3` order.
//! `DAC_PD1` is written all ones alongside it. A set bit powers the channel.

use crate::{Error, Result};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Highest valid register address.
pub const ADDR_MAX: u16 = 0x7FFF;
/// Highest valid 12-bit DAC code.
pub const CODE_MAX: u16 = 0x0FFF;
/// Full-scale divisor used when converting between codes and volts.
pub const CODE_SPAN: f64 = 4096.0;

/// Value written to `ITFC_CFG0` to trigger a soft reset.
pub const ITFC_CFG0_SOFT_RESET: u8 = 0xB0;
/// Bits of `ITFC_CFG0` that survive a soft reset (address ascend, SDO active).
pub const ITFC_CFG0_DEFAULT: u8 = 0x30;
/// Reset value of `DEV_CFG`.
pub const DEV_CFG_DEFAULT: u8 = 0x03;
/// `ADC_PD2` value that powers up the internal reference (PREF).
pub const ADC_PD2_PREF: u8 = 0x02;
/// `REG_UPDATE` value that copies all shadow codes to the outputs.
pub const REG_UPDATE_STROBE: u8 = 0x01;

/// DAC channel groups. Group A ranges live in `DAC_RNG0`, group B in `DAC_RNG1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DacGroup {
    A,
    B,
}

/// One of the eight DAC outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DacChannel {
    A0 = 0,
    A1,
    A2,
    A3,
    B0,
    B1,
    B2,
    B3,
}

impl DacChannel {
    pub const ALL: [DacChannel; 8] = [
        DacChannel::A0,
        DacChannel::A1,
        DacChannel::A2,
        DacChannel::A3,
        DacChannel::B0,
        DacChannel::B1,
        DacChannel::B2,
        DacChannel::B3,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(Error::Argument("dac channel index out of range"))
    }

    pub fn group(&self) -> DacGroup {
        if self.index() < 4 {
            DacGroup::A
        } else {
            DacGroup::B
        }
    }

    /// Position within the group, 0..=3.
    pub fn lane(&self) -> u8 {
        (self.index() % 4) as u8
    }

    pub fn data_lo(&self) -> Register {
        Register::DacDataLo(*self)
    }

    pub fn data_hi(&self) -> Register {
        Register::DacDataHi(*self)
    }

    /// Range register and bit shift of this channel's range nibble.
    pub fn range_field(&self) -> (Register, u8) {
        let register = match self.group() {
            DacGroup::A => Register::DacRng0,
            DacGroup::B => Register::DacRng1,
        };
        let shift = if self.lane() < 2 { 0 } else { 4 };
        (register, shift)
    }

    /// Power-down register and bit mask of this channel.
    pub fn power_field(&self) -> (Register, u8) {
        (Register::DacPd0, 1 << self.index())
    }
}

impl Display for DacChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let group = match self.group() {
            DacGroup::A => 'A',
            DacGroup::B => 'B',
        };
        write!(f, "DAC{group}{}", self.lane())
    }
}

impl FromStr for DacChannel {
    type Err = Error;

    /// Accepts `"DACA0"`, `"A0"` and the data register names `"DACA0_DATA_LO"`.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_suffix("_DATA_LO").unwrap_or(&upper);
        let name = name.strip_suffix("_DATA_HI").unwrap_or(name);
        let name = name.strip_prefix("DAC").unwrap_or(name);
        DacChannel::ALL
            .iter()
            .find(|ch| ch.to_string().strip_prefix("DAC") == Some(name))
            .copied()
            .ok_or_else(|| Error::UnknownName(s.to_string()))
    }
}

/// Output span selected by a 3-bit range code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DacRange {
    /// −10 V to 0 V, used to bias the gates of depletion-mode devices.
    Minus10To0 = 0x4,
    /// −5 V to +5 V.
    Bipolar5 = 0x6,
    /// 0 V to +5 V.
    Zero5 = 0x7,
}

impl DacRange {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Register value that selects this range in both nibbles.
    pub fn register_value(&self) -> u8 {
        (self.code() << 4) | self.code()
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code & 0x7 {
            0x4 => Ok(DacRange::Minus10To0),
            0x6 => Ok(DacRange::Bipolar5),
            0x7 => Ok(DacRange::Zero5),
            _ => Err(Error::Argument("unsupported dac range code")),
        }
    }

    /// Lower and upper end of the span in volts.
    pub fn span(&self) -> (f64, f64) {
        match self {
            DacRange::Minus10To0 => (-10.0, 0.0),
            DacRange::Bipolar5 => (-5.0, 5.0),
            DacRange::Zero5 => (0.0, 5.0),
        }
    }

    /// Nominal output voltage for a 12-bit code.
    pub fn code_to_volts(&self, code: u16) -> f64 {
        let (low, high) = self.span();
        low + (code.min(CODE_MAX) as f64) / CODE_SPAN * (high - low)
    }

    /// Nearest code at or below the requested voltage.
    pub fn volts_to_code(&self, volts: f64) -> Result<u16> {
        let (low, high) = self.span();
        if !(low..=high).contains(&volts) {
            return Err(Error::Argument("voltage outside of the selected range"));
        }
        let code = ((volts - low) / (high - low) * CODE_SPAN).floor() as u16;
        Ok(code.min(CODE_MAX))
    }
}

/// Symbolic register names of the DAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    ItfcCfg0,
    ItfcCfg1,
    DevCfg,
    ChipType,
    ChipIdLo,
    ChipIdHi,
    ChipVersion,
    MfgrIdLo,
    MfgrIdHi,
    RegUpdate,
    DacRng0,
    DacRng1,
    DacDataLo(DacChannel),
    DacDataHi(DacChannel),
    DacPd0,
    DacPd1,
    AdcPd2,
}

impl Register {
    /// Every named register, in address order.
    pub fn all() -> impl Iterator<Item = Register> {
        [
            Register::ItfcCfg0,
            Register::ItfcCfg1,
            Register::DevCfg,
            Register::ChipType,
            Register::ChipIdLo,
            Register::ChipIdHi,
            Register::ChipVersion,
            Register::MfgrIdLo,
            Register::MfgrIdHi,
            Register::RegUpdate,
            Register::DacRng0,
            Register::DacRng1,
        ]
        .into_iter()
        .chain(
            DacChannel::ALL
                .into_iter()
                .flat_map(|ch| [Register::DacDataLo(ch), Register::DacDataHi(ch)]),
        )
        .chain([Register::DacPd0, Register::DacPd1, Register::AdcPd2])
    }

    pub fn addr(&self) -> u16 {
        match self {
            Register::ItfcCfg0 => 0x00,
            Register::ItfcCfg1 => 0x01,
            Register::DevCfg => 0x02,
            Register::ChipType => 0x03,
            Register::ChipIdLo => 0x04,
            Register::ChipIdHi => 0x05,
            Register::ChipVersion => 0x06,
            Register::MfgrIdLo => 0x0C,
            Register::MfgrIdHi => 0x0D,
            Register::RegUpdate => 0x0F,
            Register::DacRng0 => 0x1E,
            Register::DacRng1 => 0x1F,
            Register::DacDataLo(ch) => 0x50 + 2 * ch.index() as u16,
            Register::DacDataHi(ch) => 0x51 + 2 * ch.index() as u16,
            Register::DacPd0 => 0xB2,
            Register::DacPd1 => 0xB3,
            Register::AdcPd2 => 0xB4,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Register::ItfcCfg0 => "ITFC_CFG0".into(),
            Register::ItfcCfg1 => "ITFC_CFG1".into(),
            Register::DevCfg => "DEV_CFG".into(),
            Register::ChipType => "CHIP_TYPE".into(),
            Register::ChipIdLo => "CHIP_ID_LO".into(),
            Register::ChipIdHi => "CHIP_ID_HI".into(),
            Register::ChipVersion => "CHIP_VERSION".into(),
            Register::MfgrIdLo => "MFGR_ID_LO".into(),
            Register::MfgrIdHi => "MFGR_ID_HI".into(),
            Register::RegUpdate => "REG_UPDATE".into(),
            Register::DacRng0 => "DAC_RNG0".into(),
            Register::DacRng1 => "DAC_RNG1".into(),
            Register::DacDataLo(ch) => format!("{ch}_DATA_LO"),
            Register::DacDataHi(ch) => format!("{ch}_DATA_HI"),
            Register::DacPd0 => "DAC_PD0".into(),
            Register::DacPd1 => "DAC_PD1".into(),
            Register::AdcPd2 => "ADC_PD2".into(),
        }
    }

    /// Look a register up by its address.
    pub fn from_addr(addr: u16) -> Option<Register> {
        Register::all().find(|reg| reg.addr() == addr)
    }

    /// Identity registers the host cannot write.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Register::ChipType
                | Register::ChipIdLo
                | Register::ChipIdHi
                | Register::ChipVersion
                | Register::MfgrIdLo
                | Register::MfgrIdHi
        )
    }

    /// Registers whose written value does not read back.
    pub fn is_self_clearing(&self) -> bool {
        matches!(self, Register::RegUpdate)
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{:#04x}", self.name(), self.addr())
    }
}

impl FromStr for Register {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Register::all()
            .find(|reg| reg.name() == upper)
            .ok_or_else(|| Error::UnknownName(s.to_string()))
    }
}
