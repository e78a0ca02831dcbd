//! FTDI USB identifiers, SIO vendor requests and MPSSE opcodes.
//!
//! Opcode values follow FTDI application note AN_108.

use crate::khz;
use crate::mhz;

/// FTDI USB vendor ID.
pub const FTDI_USB_VID: u16 = 0x0403;

/// The dual/quad high-speed parts the bench can be built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// FT2232H, the default ("DEVICE_2232H").
    Ft2232h,
    /// FT4232H. Only channels A and B carry an MPSSE.
    Ft4232h,
    /// FT232H. Single channel, no level-shifter mirror.
    Ft232h,
}

impl DeviceType {
    pub fn product_id(&self) -> u16 {
        match self {
            DeviceType::Ft2232h => 0x6010,
            DeviceType::Ft4232h => 0x6011,
            DeviceType::Ft232h => 0x6014,
        }
    }

    /// Number of MPSSE capable channels.
    pub fn mpsse_channels(&self) -> u8 {
        match self {
            DeviceType::Ft232h => 1,
            DeviceType::Ft2232h | DeviceType::Ft4232h => 2,
        }
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Ft2232h
    }
}

/// One interface of a multi-channel FTDI device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// USB interface number.
    pub fn interface(&self) -> u8 {
        match self {
            Channel::A => 0,
            Channel::B => 1,
        }
    }

    /// `wIndex` used by SIO vendor requests addressed to this channel.
    pub fn sio_index(&self) -> u16 {
        match self {
            Channel::A => 1,
            Channel::B => 2,
        }
    }

    pub fn endpoint_in(&self) -> u8 {
        match self {
            Channel::A => 0x81,
            Channel::B => 0x83,
        }
    }

    pub fn endpoint_out(&self) -> u8 {
        match self {
            Channel::A => 0x02,
            Channel::B => 0x04,
        }
    }

    /// Suffix appended to the device description and serial by the vendor driver.
    pub fn suffix(&self) -> char {
        match self {
            Channel::A => 'A',
            Channel::B => 'B',
        }
    }
}

// SIO vendor request codes
pub const SIO_RESET_REQUEST: u8 = 0x00;
pub const SIO_SET_FLOW_CTRL_REQUEST: u8 = 0x02;
pub const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;
pub const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;

// Reset sub-commands
pub const SIO_RESET_SIO: u16 = 0;
pub const SIO_TCOFLUSH: u16 = 1;
pub const SIO_TCIFLUSH: u16 = 2;

// Flow control values
pub const SIO_DISABLE_FLOW_CTRL: u16 = 0x0;
pub const SIO_RTS_CTS_HS: u16 = 0x1 << 8;

/// Number of modem status bytes prefixed to every bulk IN packet.
pub const MODEM_STATUS_LEN: usize = 2;

/// Bit modes accepted by `SIO_SET_BITMODE_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BitMode {
    Reset = 0x00,
    Mpsse = 0x02,
}

/// Flow control settings accepted by `SIO_SET_FLOW_CTRL_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    RtsCts,
}

impl FlowControl {
    pub fn value(&self) -> u16 {
        match self {
            FlowControl::None => SIO_DISABLE_FLOW_CTRL,
            FlowControl::RtsCts => SIO_RTS_CTS_HS,
        }
    }
}

/// MPSSE opcodes.
pub mod mpsse {
    /// Clock bytes out on the falling edge and in, MSB first.
    pub const CLOCK_BYTES_INOUT: u8 = 0x34;
    pub const SET_BITS_LOW: u8 = 0x80;
    pub const GET_BITS_LOW: u8 = 0x81;
    pub const SET_BITS_HIGH: u8 = 0x82;
    pub const GET_BITS_HIGH: u8 = 0x83;
    pub const LOOPBACK_START: u8 = 0x84;
    pub const LOOPBACK_END: u8 = 0x85;
    pub const TCK_DIVISOR: u8 = 0x86;
    pub const SEND_IMMEDIATE: u8 = 0x87;
    pub const DIS_DIV_5: u8 = 0x8A;
    pub const EN_DIV_5: u8 = 0x8B;
    pub const EN_3_PHASE: u8 = 0x8C;
    pub const DIS_3_PHASE: u8 = 0x8D;
    pub const EN_ADAPTIVE: u8 = 0x96;
    pub const DIS_ADAPTIVE: u8 = 0x97;

    /// First byte of the engine's answer to an opcode it does not know.
    pub const BAD_COMMAND: u8 = 0xFA;

    /// Opcodes deliberately sent during open to prove the engine is alive.
    pub const SYNC_OPCODES: [u8; 2] = [0x0A, 0xAB];
}

/// Master clock of the H-type MPSSE with the divide-by-5 prescaler disabled.
pub const MPSSE_BASE_CLOCK: u32 = mhz!(60);
pub const MPSSE_CLOCK_MIN: u32 = khz!(1);
pub const MPSSE_CLOCK_MAX: u32 = mhz!(30);
pub const MPSSE_CLOCK_DEFAULT: u32 = mhz!(1);

/// Latency timer in milliseconds programmed during open.
pub const LATENCY_TIMER_MS: u8 = 2;

/// Default description of the FT2232H as reported by the vendor driver.
pub const DEFAULT_DESCRIPTION: &str = "Dual RS232-HS";
