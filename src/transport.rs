//! USB-MPSSE transport.
//!
//! [`Mpsse`] owns the data channel of the bridge and, optionally, the level-shifter
//! channel. The level-shifter channel runs every pin as an output and mirrors the
//! *direction* register of the data channel into its *value* register: an input
//! pin on the data side drives a `0` into the matching transceiver, turning it
//! towards the host.

use crate::usb::FtdiPort;
use crate::{Error, Result};
use afe_globals::ftdi::mpsse::{BAD_COMMAND, SYNC_OPCODES};
use afe_globals::ftdi::{
    BitMode, DEFAULT_DESCRIPTION, DeviceType, FlowControl, LATENCY_TIMER_MS, MPSSE_CLOCK_DEFAULT,
};
use afe_globals::gpio::{LOW_FIXED_DIR, LOW_FIXED_IDLE, LOW_FIXED_MASK};
use afe_globals::{GpioPin, IO_TIMEOUT, Port, QUEUE_POLL_LIMIT};
use afe_mpsse::clock::{clock_divisor, divisor_frequency};
use afe_mpsse::{MpsseCommand, PortState};
use std::time::Duration;

/// Pause between purging the queues and the first MPSSE command.
const PURGE_SETTLE: Duration = Duration::from_millis(50);

/// How the adapter is picked during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Product description without the channel suffix, e.g. `"Dual RS232-HS"`.
    Description(String),
    /// 8 character serial number, or 9 characters including the channel suffix.
    Serial(String),
}

impl Default for DeviceSelector {
    fn default() -> Self {
        DeviceSelector::Description(DEFAULT_DESCRIPTION.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub device_type: DeviceType,
    pub selector: DeviceSelector,
    pub clock_hz: u32,
    pub latency_ms: u8,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Idle state of the low port. Bits 0..=3 are forced to their SPI roles.
    pub low_idle: PortState,
    pub high_idle: PortState,
    /// Open the second channel as level-shifter mirror.
    pub level_shifter: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::default(),
            selector: DeviceSelector::default(),
            clock_hz: MPSSE_CLOCK_DEFAULT,
            latency_ms: LATENCY_TIMER_MS,
            read_timeout: IO_TIMEOUT,
            write_timeout: IO_TIMEOUT,
            low_idle: PortState::new(LOW_FIXED_IDLE, LOW_FIXED_DIR),
            high_idle: PortState::new(0x00, 0x00),
            level_shifter: true,
        }
    }
}

fn fix_low_dir(dir: u8) -> u8 {
    (dir & !LOW_FIXED_MASK) | LOW_FIXED_DIR
}

fn fixed_low(state: PortState) -> PortState {
    PortState::new(
        (state.value & !LOW_FIXED_MASK) | LOW_FIXED_IDLE,
        fix_low_dir(state.dir),
    )
}

/// An opened MPSSE channel with its cached GPIO state.
pub struct Mpsse<P: FtdiPort> {
    port: P,
    mirror: Option<P>,
    clock_hz: u32,
    poll_limit: usize,
    idle: [PortState; 2],
    current: [PortState; 2],
    open: bool,
}

fn index(port: Port) -> usize {
    match port {
        Port::Low => 0,
        Port::High => 1,
    }
}

impl<P: FtdiPort> Mpsse<P> {
    /// Bring up the MPSSE engine on `port` (and `mirror`) and install the idle GPIO state.
    pub fn open(port: P, mirror: Option<P>, config: &TransportConfig) -> Result<Self> {
        let divisor = clock_divisor(config.clock_hz).map_err(|_| {
            log::error!("MPSSE clock {} Hz rejected", config.clock_hz);
            Error::ClockOutOfRange(config.clock_hz)
        })?;

        let mut mpsse = Self {
            port,
            mirror,
            clock_hz: divisor_frequency(divisor),
            poll_limit: QUEUE_POLL_LIMIT,
            idle: [fixed_low(config.low_idle), config.high_idle],
            current: [PortState::default(); 2],
            open: false,
        };

        log::debug!("[*] Init - Configure data channel");
        if let Err(e) = mpsse.bring_up(config, divisor) {
            mpsse.abandon();
            return Err(e);
        }
        mpsse.open = true;
        Ok(mpsse)
    }

    fn bring_up(&mut self, config: &TransportConfig, divisor: u16) -> Result<()> {
        Self::configure(&mut self.port, config)?;
        Self::sync(&mut self.port, self.poll_limit)?;

        let mut cmd = MpsseCommand::new();
        cmd.loopback(false)
            .divide_by_5(false)
            .adaptive_clocking(false)
            .three_phase_clocking(false)
            .divisor(divisor);
        self.write_cmd(&cmd)?;
        log::debug!("[*] Init - Clock {} Hz (divisor {divisor})", self.clock_hz);

        if let Some(mirror) = self.mirror.as_mut() {
            log::debug!("[*] Init - Configure level shifter channel");
            Self::configure(mirror, config)?;
            Self::sync(mirror, self.poll_limit)?;
            let mut cmd = MpsseCommand::new();
            cmd.loopback(false).divide_by_5(false).divisor(divisor);
            write_all(mirror, cmd.as_bytes())?;
        }

        log::debug!("[*] Init - Install idle GPIO state");
        let [low, high] = self.idle;
        self.set_low(low.value, low.dir)?;
        self.set_high(high.value, high.dir)
    }

    /// Leave MPSSE mode on both channels after a failed bring-up.
    fn abandon(&mut self) {
        let ports = std::iter::once(&mut self.port).chain(self.mirror.as_mut());
        for port in ports {
            if let Err(e) = port.set_bitmode(0x00, BitMode::Reset) {
                log::error!("resetting bit mode after failed open: {e}");
            }
        }
    }

    fn configure(port: &mut P, config: &TransportConfig) -> Result<()> {
        port.reset()?;
        port.set_bitmode(0x00, BitMode::Reset)?;
        port.set_bitmode(0x00, BitMode::Mpsse)?;
        port.set_latency_timer(config.latency_ms)?;
        port.set_flow_control(FlowControl::RtsCts)?;
        port.set_timeouts(config.read_timeout, config.write_timeout)?;
        port.purge()?;
        std::thread::sleep(PURGE_SETTLE);
        Ok(())
    }

    /// Send each sync opcode on its own and expect `[0xFA, opcode]` back.
    fn sync(port: &mut P, poll_limit: usize) -> Result<()> {
        for opcode in SYNC_OPCODES {
            write_all(port, &[opcode])?;
            let response = match drain(port, 2, poll_limit) {
                Ok(response) => response,
                Err(Error::Desync { .. }) => Vec::new(),
                Err(e) => return Err(e),
            };
            log::trace!("bad opcode {opcode:#04x} answered with {response:02x?}");
            if response != [BAD_COMMAND, opcode] {
                log::error!("MPSSE engine did not answer bad opcode {opcode:#04x}");
                return Err(Error::MpsseInit { opcode, response });
            }
        }
        Ok(())
    }

    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// Cached value and direction of `port`.
    pub fn state(&self, port: Port) -> PortState {
        self.current[index(port)]
    }

    pub fn low(&self) -> PortState {
        self.state(Port::Low)
    }

    pub fn high(&self) -> PortState {
        self.state(Port::High)
    }

    /// Idle state of both ports, low port first.
    pub fn idle(&self) -> [PortState; 2] {
        self.idle
    }

    pub fn poll_limit(&self) -> usize {
        self.poll_limit
    }

    pub fn set_poll_limit(&mut self, limit: usize) {
        self.poll_limit = limit.max(1);
    }

    /// Reprogram the clock divisor.
    pub fn set_clock(&mut self, freq_hz: u32) -> Result<u32> {
        let divisor = clock_divisor(freq_hz).map_err(|_| Error::ClockOutOfRange(freq_hz))?;
        let mut cmd = MpsseCommand::new();
        cmd.divide_by_5(false).divisor(divisor);
        self.write_cmd(&cmd)?;
        self.clock_hz = divisor_frequency(divisor);
        log::debug!("MPSSE clock set to {} Hz", self.clock_hz);
        Ok(self.clock_hz)
    }

    /// Drive a byte-port and mirror its direction into the level shifter.
    pub fn set_port(&mut self, port: Port, value: u8, dir: u8) -> Result<()> {
        let dir = match port {
            Port::Low => fix_low_dir(dir),
            Port::High => dir,
        };
        let mut cmd = MpsseCommand::new();
        cmd.set_bits(port, value, dir);
        self.write_cmd(&cmd)?;
        self.current[index(port)] = PortState::new(value, dir);

        if let Some(mirror) = self.mirror.as_mut() {
            let mut cmd = MpsseCommand::new();
            cmd.set_bits(port, dir, 0xFF);
            write_all(mirror, cmd.as_bytes())?;
        }
        Ok(())
    }

    pub fn set_low(&mut self, value: u8, dir: u8) -> Result<()> {
        self.set_port(Port::Low, value, dir)
    }

    pub fn set_high(&mut self, value: u8, dir: u8) -> Result<()> {
        self.set_port(Port::High, value, dir)
    }

    /// Drive `pin` high. The direction is left untouched.
    pub fn set_pin(&mut self, pin: GpioPin) -> Result<()> {
        let state = self.state(pin.port());
        self.set_port(pin.port(), state.value | pin.mask(), state.dir)
    }

    /// Drive `pin` low. The direction is left untouched.
    pub fn clear_pin(&mut self, pin: GpioPin) -> Result<()> {
        let state = self.state(pin.port());
        self.set_port(pin.port(), state.value & !pin.mask(), state.dir)
    }

    pub fn set_direction(&mut self, pin: GpioPin, output: bool) -> Result<()> {
        let state = self.state(pin.port());
        let dir = if output {
            state.dir | pin.mask()
        } else {
            state.dir & !pin.mask()
        };
        self.set_port(pin.port(), state.value, dir)
    }

    /// Make `pin` an output idling at `high`, now and after every transaction.
    pub fn claim_output(&mut self, pin: GpioPin, high: bool) -> Result<()> {
        let idle = &mut self.idle[index(pin.port())];
        idle.dir |= pin.mask();
        if high {
            idle.value |= pin.mask();
        } else {
            idle.value &= !pin.mask();
        }
        let idle = *idle;
        self.set_port(pin.port(), idle.value, idle.dir)
    }

    /// Sample the live levels of `port`.
    pub fn read_port(&mut self, port: Port) -> Result<u8> {
        let mut cmd = MpsseCommand::new();
        cmd.get_bits(port).send_immediate();
        let response = self.transact(&cmd)?;
        response.first().copied().ok_or(Error::Desync {
            expected: 1,
            actual: 0,
        })
    }

    pub fn read_low(&mut self) -> Result<u8> {
        self.read_port(Port::Low)
    }

    pub fn read_high(&mut self) -> Result<u8> {
        self.read_port(Port::High)
    }

    /// Emit raw MPSSE bytes on the data channel.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        write_all(&mut self.port, bytes)
    }

    pub fn write_cmd(&mut self, cmd: &MpsseCommand) -> Result<()> {
        self.write_raw(cmd.as_bytes())
    }

    /// Execute `cmd` and drain exactly the number of bytes it answers with.
    pub fn transact(&mut self, cmd: &MpsseCommand) -> Result<Vec<u8>> {
        self.write_cmd(cmd)?;
        drain(&mut self.port, cmd.response_len(), self.poll_limit)
    }

    /// Return both ports to idle and leave MPSSE mode.
    ///
    /// The USB handles stay claimed until the transport is dropped.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        log::debug!("Closing MPSSE transport");
        let [low, high] = self.idle;
        self.set_low(low.value, low.dir)?;
        self.set_high(high.value, high.dir)?;
        self.port.set_bitmode(0x00, BitMode::Reset)?;
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.set_bitmode(0x00, BitMode::Reset)?;
        }
        self.open = false;
        Ok(())
    }
}

impl<P: FtdiPort> Drop for Mpsse<P> {
    fn drop(&mut self) {
        if self.open {
            log::warn!("MPSSE transport dropped without close()");
        }
    }
}

fn write_all<P: FtdiPort>(port: &mut P, bytes: &[u8]) -> Result<()> {
    log::trace!("MPSSE out: {bytes:02x?}");
    let written = port.write(bytes)?;
    if written != bytes.len() {
        log::error!("short write: {written} of {} bytes", bytes.len());
        return Err(Error::ShortWrite {
            written,
            expected: bytes.len(),
        });
    }
    Ok(())
}

/// Poll the receive queue until it holds exactly `expected` bytes and read them.
fn drain<P: FtdiPort>(port: &mut P, expected: usize, poll_limit: usize) -> Result<Vec<u8>> {
    if expected == 0 {
        return Ok(Vec::new());
    }
    let mut queued = 0;
    for _ in 0..poll_limit {
        queued = port.queue_status()?;
        if queued >= expected {
            break;
        }
    }
    if queued != expected {
        log::error!("receive queue holds {queued} bytes, expected {expected}");
        return Err(Error::Desync {
            expected,
            actual: queued,
        });
    }
    let data = port.read(expected)?;
    log::trace!("MPSSE in:  {data:02x?}");
    if data.len() != expected {
        return Err(Error::Desync {
            expected,
            actual: data.len(),
        });
    }
    Ok(data)
}
