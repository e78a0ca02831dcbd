//! Register-level driver of the 12-bit, 8-channel bias DAC.
//!
//! DAC data writes only load shadow registers. Nothing changes at the analog
//! outputs until `REG_UPDATE` is strobed, which copies every shadow register to
//! its output at once. [`AfeDac`] keeps track of what is staged and what is live.

use crate::spi::{SpiBridge, SpiTransaction};
use crate::usb::FtdiPort;
use crate::{Error, Result};
use afe_globals::registers::{ADC_PD2_PREF, ITFC_CFG0_SOFT_RESET, REG_UPDATE_STROBE};
use afe_globals::{DacChannel, DacGroup, DacRange, Register, SOFT_RESET_TIME};
use afe_mpsse::frame::{HEADER_LEN, read_frame, read_payload, write_frame};
use afe_mpsse::{DacCode, encode_unipolar};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Attempts of a verified write before giving up.
pub const VERIFY_RETRIES: usize = 5;

#[derive(Debug, Clone)]
pub struct DacConfig {
    /// Read back every write and compare.
    pub verify: bool,
    pub retries: usize,
    pub soft_reset_time: Duration,
}

impl Default for DacConfig {
    fn default() -> Self {
        Self {
            verify: true,
            retries: VERIFY_RETRIES,
            soft_reset_time: SOFT_RESET_TIME,
        }
    }
}

/// Identity registers of the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipIdentity {
    pub chip_type: u8,
    pub chip_id: u16,
    pub mfgr_id: u16,
    pub version: u8,
}

impl Display for ChipIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type {:#04x}, id {:#06x}, manufacturer {:#06x}, version {:#04x}",
            self.chip_type, self.chip_id, self.mfgr_id, self.version
        )
    }
}

/// Host-side view of one DAC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    pub powered: bool,
    pub range: Option<DacRange>,
    /// Code written to the shadow registers but not yet strobed.
    pub pending: Option<DacCode>,
    /// Code at the output after the last strobe.
    pub live: Option<DacCode>,
}

pub struct AfeDac<P: FtdiPort> {
    spi: SpiBridge<P>,
    config: DacConfig,
    channels: [ChannelState; 8],
}

impl<P: FtdiPort> AfeDac<P> {
    pub fn new(spi: SpiBridge<P>, config: DacConfig) -> Self {
        Self {
            spi,
            config,
            channels: [ChannelState::default(); 8],
        }
    }

    pub fn config(&self) -> &DacConfig {
        &self.config
    }

    pub fn set_verify(&mut self, verify: bool) {
        self.config.verify = verify;
    }

    pub fn spi(&self) -> &SpiBridge<P> {
        &self.spi
    }

    pub fn spi_mut(&mut self) -> &mut SpiBridge<P> {
        &mut self.spi
    }

    /// Read `len` consecutive registers starting at `addr`.
    pub fn read(&mut self, addr: u16, len: usize) -> Result<Vec<u8>> {
        let frame = read_frame(addr, len)?;
        let response = self
            .spi
            .execute(&SpiTransaction::read(&frame[..HEADER_LEN], len))?;
        let data = read_payload(&response).to_vec();
        log::trace!("read  {addr:#06x}: {data:02x?}");
        Ok(data)
    }

    pub fn read_register(&mut self, reg: Register) -> Result<u8> {
        let data = self.read(reg.addr(), 1)?;
        data.first().copied().ok_or(Error::Desync {
            expected: 1,
            actual: 0,
        })
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        self.write_bytes(addr, &[value])
    }

    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<()> {
        self.write_byte(reg.addr(), value)
    }

    /// Write `data` to consecutive registers starting at `addr`.
    ///
    /// With verification enabled the range is read back after every attempt. A
    /// mismatch is read once more before the write is repeated, so a glitch on the
    /// readback does not cost a rewrite.
    pub fn write_bytes(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        let frame = write_frame(addr, data)?;
        let touched = addr..addr.saturating_add(data.len() as u16);
        if let Some(reg) = touched
            .clone()
            .filter_map(Register::from_addr)
            .find(Register::is_read_only)
        {
            log::error!("refusing to write read-only register {reg}");
            return Err(Error::Argument("register is read-only"));
        }

        log::debug!("write {addr:#06x}: {data:02x?}");
        if !self.config.verify || self.self_clearing(addr, data) {
            return self.spi.write(&frame);
        }

        let mut actual = Vec::new();
        for attempt in 1..=self.config.retries {
            self.spi.write(&frame)?;
            actual = self.read(addr, data.len())?;
            if actual == data {
                return Ok(());
            }
            log::warn!(
                "verify {addr:#06x} attempt {attempt}: wrote {data:02x?}, read {actual:02x?}"
            );
            actual = self.read(addr, data.len())?;
            if actual == data {
                log::warn!("verify {addr:#06x}: second readback matches");
                return Ok(());
            }
        }
        log::error!("verify {addr:#06x} failed after {} attempts", self.config.retries);
        Err(Error::RegisterVerify {
            addr,
            expected: data.to_vec(),
            actual,
        })
    }

    /// Writes whose effect cannot be read back: the update strobe and a soft reset.
    fn self_clearing(&self, addr: u16, data: &[u8]) -> bool {
        data.iter().enumerate().any(|(offset, value)| {
            match Register::from_addr(addr.saturating_add(offset as u16)) {
                Some(Register::RegUpdate) => true,
                Some(Register::ItfcCfg0) => value & 0x80 != 0,
                _ => false,
            }
        })
    }

    /// Reset every register to its default and wait until the chip is back.
    pub fn soft_reset(&mut self) -> Result<()> {
        log::debug!("DAC soft reset");
        let frame = write_frame(Register::ItfcCfg0.addr(), &[ITFC_CFG0_SOFT_RESET])?;
        self.spi.write(&frame)?;
        std::thread::sleep(self.config.soft_reset_time);
        self.channels = [ChannelState::default(); 8];
        Ok(())
    }

    /// Read the identity registers. A chip that cannot be read, or answers with
    /// a floating bus, is unresponsive.
    pub fn identity(&mut self) -> Result<ChipIdentity> {
        let ident = self
            .read(Register::ChipType.addr(), 4)
            .and_then(|ident| Ok((ident, self.read(Register::MfgrIdLo.addr(), 2)?)));
        let (ident, mfgr) = match ident {
            Ok(data) => data,
            Err(e) => {
                log::error!("DAC identity read failed: {e}");
                return Err(Error::Unresponsive);
            }
        };
        let bytes = ident.iter().chain(mfgr.iter());
        if bytes.clone().all(|b| *b == 0x00) || bytes.clone().all(|b| *b == 0xFF) {
            log::error!("DAC identity reads {ident:02x?} {mfgr:02x?}");
            return Err(Error::Unresponsive);
        }
        let identity = ChipIdentity {
            chip_type: ident[0],
            chip_id: u16::from_le_bytes([ident[1], ident[2]]),
            mfgr_id: u16::from_le_bytes([mfgr[0], mfgr[1]]),
            version: ident[3],
        };
        log::info!("DAC identity: {identity}");
        Ok(identity)
    }

    /// Power up the internal reference.
    pub fn enable_reference(&mut self) -> Result<()> {
        self.write_register(Register::AdcPd2, ADC_PD2_PREF)
    }

    /// Select `range` for every channel of `group`.
    pub fn set_range(&mut self, group: DacGroup, range: DacRange) -> Result<()> {
        let reg = match group {
            DacGroup::A => Register::DacRng0,
            DacGroup::B => Register::DacRng1,
        };
        self.write_register(reg, range.register_value())?;
        for state in self.group_states(group) {
            state.range = Some(range);
        }
        Ok(())
    }

    /// Select `range` for `channel` and the neighbour sharing its range field.
    pub fn set_channel_range(&mut self, channel: DacChannel, range: DacRange) -> Result<()> {
        let (reg, shift) = channel.range_field();
        let mut value = self.read_register(reg)?;
        value &= !(0x0F << shift);
        value |= range.code() << shift;
        self.write_register(reg, value)?;
        for ch in DacChannel::ALL {
            if ch.range_field() == (reg, shift) {
                self.channels[ch.index()].range = Some(range);
            }
        }
        Ok(())
    }

    /// Power the channels whose bit is set in `mask` (bit n is channel n).
    pub fn power_dacs(&mut self, mask: u8) -> Result<()> {
        self.write_bytes(Register::DacPd0.addr(), &[mask, 0xFF])?;
        for ch in DacChannel::ALL {
            let (_, bit) = ch.power_field();
            self.channels[ch.index()].powered = mask & bit != 0;
        }
        Ok(())
    }

    /// Load `code` into the shadow registers of `channel`.
    pub fn stage_code(&mut self, channel: DacChannel, code: DacCode) -> Result<()> {
        self.stage_codes(channel, &[code])
    }

    /// Burst-load consecutive channels starting at `first`.
    pub fn stage_codes(&mut self, first: DacChannel, codes: &[DacCode]) -> Result<()> {
        if codes.is_empty() || first.index() + codes.len() > DacChannel::ALL.len() {
            return Err(Error::Argument("codes run past the last dac channel"));
        }
        self.write_bytes(first.data_lo().addr(), &DacCode::pack(codes))?;
        for (offset, code) in codes.iter().enumerate() {
            self.channels[first.index() + offset].pending = Some(*code);
        }
        Ok(())
    }

    /// Load a voltage of the 0 V to +5 V range into the shadow registers of `channel`.
    pub fn stage_unipolar(&mut self, channel: DacChannel, volts: f64) -> Result<()> {
        let bytes = encode_unipolar(volts)?;
        self.write_bytes(channel.data_lo().addr(), &bytes)?;
        self.channels[channel.index()].pending = Some(DacCode::from_bytes(bytes));
        Ok(())
    }

    /// Strobe `REG_UPDATE`, moving every staged code to the outputs.
    pub fn update(&mut self) -> Result<()> {
        self.write_register(Register::RegUpdate, REG_UPDATE_STROBE)?;
        for state in self.channels.iter_mut() {
            if let Some(code) = state.pending.take() {
                state.live = Some(code);
            }
        }
        Ok(())
    }

    /// Code held in the data registers of `channel`.
    pub fn read_code(&mut self, channel: DacChannel) -> Result<DacCode> {
        let data = self.read(channel.data_lo().addr(), 2)?;
        Ok(DacCode::from_bytes([data[0], data[1]]))
    }

    pub fn channel_state(&self, channel: DacChannel) -> ChannelState {
        self.channels[channel.index()]
    }

    fn group_states(&mut self, group: DacGroup) -> impl Iterator<Item = &mut ChannelState> {
        self.channels
            .iter_mut()
            .zip(DacChannel::ALL)
            .filter(move |(_, ch)| ch.group() == group)
            .map(|(state, _)| state)
    }

    pub fn close(&mut self) -> Result<()> {
        self.spi.close()
    }
}
