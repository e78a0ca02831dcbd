//! Enumeration of FTDI adapters.
//!
//! The device list is process wide. An [`Opener`] enumerates it once and hands out
//! claimed channels until it is closed.

use crate::transport::{DeviceSelector, TransportConfig};
use crate::usb::FtdiChannel;
use crate::{Error, Result};
use afe_globals::ftdi::{Channel, DeviceType, FTDI_USB_VID};
use atomic_enum::atomic_enum;
use nusb::{DeviceInfo, MaybeFuture};
use std::sync::atomic::Ordering;

#[atomic_enum]
#[derive(PartialEq)]
pub enum OpenerState {
    Idle,
    Ready,
    Closed,
}

pub struct Opener {
    state: AtomicOpenerState,
    devices: Vec<DeviceInfo>,
}

impl Default for Opener {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial number as reported by USB, without the channel suffix.
fn serial_base(serial: &str) -> Option<&str> {
    match serial.len() {
        8 => Some(serial),
        9 if serial.ends_with(['A', 'B']) => Some(&serial[..8]),
        _ => None,
    }
}

/// The primary channel of a dual-channel part reports `"<description> A"`.
fn description_matches(product: Option<&str>, description: &str) -> bool {
    let primary = format!("{description} {}", Channel::A.suffix());
    product.is_some_and(|product| product == description || product == primary)
}

fn serial_matches(serial_number: Option<&str>, wanted: &str) -> bool {
    match serial_base(wanted) {
        Some(base) => serial_number == Some(base),
        None => false,
    }
}

fn matches(info: &DeviceInfo, selector: &DeviceSelector) -> bool {
    match selector {
        DeviceSelector::Description(description) => {
            description_matches(info.product_string(), description)
        }
        DeviceSelector::Serial(serial) => serial_matches(info.serial_number(), serial),
    }
}

impl Opener {
    pub fn new() -> Self {
        Self {
            state: AtomicOpenerState::new(OpenerState::Idle),
            devices: Vec::new(),
        }
    }

    pub fn state(&self) -> OpenerState {
        self.state.load(Ordering::SeqCst)
    }

    /// Enumerate all adapters of `device_type`. Returns the number found.
    pub fn enumerate(&mut self, device_type: DeviceType) -> Result<usize> {
        if self.state() == OpenerState::Closed {
            return Err(Error::Argument("opener already closed"));
        }
        self.devices = nusb::list_devices()
            .wait()?
            .filter(|dev| {
                dev.vendor_id() == FTDI_USB_VID && dev.product_id() == device_type.product_id()
            })
            .collect();
        log::debug!(
            "[*] Init - {} {device_type:?} adapter(s) found",
            self.devices.len()
        );
        self.state.store(OpenerState::Ready, Ordering::SeqCst);
        Ok(self.devices.len())
    }

    /// Claim the data channel and, if requested, the level-shifter channel of the
    /// adapter selected by `config`.
    pub fn open(&mut self, config: &TransportConfig) -> Result<(FtdiChannel, Option<FtdiChannel>)> {
        if self.state() != OpenerState::Ready {
            self.enumerate(config.device_type)?;
        }
        let info = self
            .devices
            .iter()
            .find(|info| matches(info, &config.selector))
            .ok_or_else(|| {
                log::error!("no adapter matches {:?}", config.selector);
                Error::NotFound
            })?;
        log::debug!(
            "[*] Init - Opening {:?} serial {:?}",
            info.product_string(),
            info.serial_number()
        );

        let device = info.open().wait().map_err(|e| {
            log::error!("cannot open adapter: {e}");
            Error::InUse
        })?;
        let claim = |channel: Channel| {
            device
                .detach_and_claim_interface(channel.interface())
                .wait()
                .map_err(|e| {
                    log::error!("cannot claim channel {channel:?}: {e}");
                    Error::InUse
                })
        };

        let primary = FtdiChannel::new(claim(Channel::A)?, Channel::A)?;
        let mirror = if config.level_shifter && config.device_type.mpsse_channels() > 1 {
            Some(FtdiChannel::new(claim(Channel::B)?, Channel::B)?)
        } else {
            None
        };
        Ok((primary, mirror))
    }

    /// Forget the device list. Channels already handed out stay valid.
    pub fn close(&mut self) {
        self.devices.clear();
        self.state.store(OpenerState::Closed, Ordering::SeqCst);
    }
}

impl Drop for Opener {
    fn drop(&mut self) {
        if self.state() != OpenerState::Closed {
            self.close();
        }
    }
}
