#![allow(dead_code)]
// This module has been created using mod.rs in a subfolder, instead of just creating a common.rs under tests
// This is due to the test runner then not searching for runnable tests in mod.rs
// https://doc.rust-lang.org/rust-by-example/testing/integration_testing.html
//
// It holds a simulated FT2232H: an MPSSE interpreter per channel, the data channel
// wired to a model of the bias DAC.

use afe_bias::ftdi::mpsse::*;
use afe_bias::ftdi::{BitMode, FlowControl};
use afe_bias::registers::{
    DEV_CFG_DEFAULT, ITFC_CFG0_DEFAULT, ITFC_CFG0_SOFT_RESET, REG_UPDATE_STROBE,
};
use afe_bias::{
    Bench, BenchConfig, DacChannel, FtdiPort, GpioPin, Port, Register, Result,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

pub const CHIP_TYPE: u8 = 0x08;
pub const CHIP_ID: u16 = 0x0C36;
pub const CHIP_VERSION: u8 = 0x01;
pub const MFGR_ID: u16 = 0x0451;

pub fn logging_init(module: &str) {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Error)
        .filter_module(module, log::LevelFilter::Trace)
        .filter_module("afe_bias", log::LevelFilter::Trace)
        .try_init();
}

/// Register file of the bias DAC.
#[derive(Debug)]
pub struct DacModel {
    pub regs: Vec<u8>,
    /// Codes at the analog outputs.
    pub live: [u16; 8],
    /// Every code completed in a data register pair, in write order.
    pub shadow_history: Vec<(DacChannel, u16)>,
    /// Live codes after every strobe.
    pub live_history: Vec<[u16; 8]>,
    pub last_strobe: Option<Instant>,
    pub soft_resets: usize,
    /// Data bytes written per address.
    pub writes: HashMap<u16, usize>,
    /// Registers that always read back this value.
    pub stuck: HashMap<u16, u8>,
    /// Number of upcoming register reads that return inverted data.
    pub glitch_reads: usize,
    /// Number of upcoming register writes that are lost.
    pub drop_writes: usize,
    /// The chip does not drive MISO at all.
    pub absent: bool,
}

impl Default for DacModel {
    fn default() -> Self {
        let mut dac = Self {
            regs: vec![0; 0x8000],
            live: [0; 8],
            shadow_history: Vec::new(),
            live_history: Vec::new(),
            last_strobe: None,
            soft_resets: 0,
            writes: HashMap::new(),
            stuck: HashMap::new(),
            glitch_reads: 0,
            drop_writes: 0,
            absent: false,
        };
        dac.reset();
        dac
    }
}

impl DacModel {
    pub fn reset(&mut self) {
        self.regs.iter_mut().for_each(|r| *r = 0);
        self.live = [0; 8];
        self.regs[Register::ItfcCfg0.addr() as usize] = ITFC_CFG0_DEFAULT;
        self.regs[Register::DevCfg.addr() as usize] = DEV_CFG_DEFAULT;
        self.regs[Register::ChipType.addr() as usize] = CHIP_TYPE;
        let [lo, hi] = CHIP_ID.to_le_bytes();
        self.regs[Register::ChipIdLo.addr() as usize] = lo;
        self.regs[Register::ChipIdHi.addr() as usize] = hi;
        self.regs[Register::ChipVersion.addr() as usize] = CHIP_VERSION;
        let [lo, hi] = MFGR_ID.to_le_bytes();
        self.regs[Register::MfgrIdLo.addr() as usize] = lo;
        self.regs[Register::MfgrIdHi.addr() as usize] = hi;
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.regs[reg.addr() as usize]
    }

    pub fn shadow(&self, channel: DacChannel) -> u16 {
        let lo = self.regs[channel.data_lo().addr() as usize] as u16;
        let hi = self.regs[channel.data_hi().addr() as usize] as u16;
        lo | ((hi & 0x0F) << 8)
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        if let Some(value) = self.stuck.get(&addr) {
            return *value;
        }
        let value = self.regs[addr as usize];
        if self.glitch_reads > 0 {
            self.glitch_reads -= 1;
            return value ^ 0xFF;
        }
        value
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        if self.drop_writes > 0 {
            self.drop_writes -= 1;
            return;
        }
        *self.writes.entry(addr).or_default() += 1;
        match Register::from_addr(addr) {
            Some(Register::ItfcCfg0) if value & 0x80 != 0 => {
                assert_eq!(value, ITFC_CFG0_SOFT_RESET);
                self.soft_resets += 1;
                self.reset();
            }
            Some(Register::RegUpdate) => {
                if value & REG_UPDATE_STROBE != 0 {
                    for ch in DacChannel::ALL {
                        self.live[ch.index()] = self.shadow(ch);
                    }
                    self.live_history.push(self.live);
                    self.last_strobe = Some(Instant::now());
                }
            }
            Some(reg) if reg.is_read_only() => {}
            Some(Register::DacDataHi(ch)) => {
                self.regs[addr as usize] = value;
                self.shadow_history.push((ch, self.shadow(ch)));
            }
            _ => self.regs[addr as usize] = value,
        }
    }
}

/// SPI slave position within one chip-select window.
#[derive(Debug, Default)]
struct Slave {
    selected: bool,
    index: usize,
    read: bool,
    addr: u16,
}

/// One simulated FTDI channel.
#[derive(Debug)]
pub struct SimChannel {
    pub calls: Vec<String>,
    pub bitmode: BitMode,
    pub latency_ms: u8,
    pub flow: FlowControl,
    pub timeouts: Option<(Duration, Duration)>,
    pub divisor: Option<u16>,
    pub loopback: bool,
    pub divide_by_5: bool,
    pub adaptive: bool,
    pub three_phase: bool,
    pub low: (u8, u8),
    pub high: (u8, u8),
    pub gpio_writes: Vec<(Port, u8, u8)>,
    /// Every buffer handed to `write`.
    pub tx: Vec<Vec<u8>>,
    pub rx: VecDeque<u8>,
    pub dac: Option<DacModel>,
    pub chip_select: GpioPin,
    /// Active-low buffer enable of a 3-wire bus. `None` for a 4-wire bus.
    pub buffer_enable: Option<GpioPin>,
    pub short_write: Option<usize>,
    /// Writes from this index on (counted in `tx`) time out.
    pub fail_writes_from: Option<usize>,
    pub extra_response: usize,
    pub mute: bool,
    pub no_echo: bool,
    slave: Slave,
}

impl SimChannel {
    pub fn new(dac: Option<DacModel>) -> Self {
        Self {
            calls: Vec::new(),
            bitmode: BitMode::Reset,
            latency_ms: 16,
            flow: FlowControl::None,
            timeouts: None,
            divisor: None,
            loopback: true,
            divide_by_5: true,
            adaptive: true,
            three_phase: true,
            low: (0, 0),
            high: (0, 0),
            gpio_writes: Vec::new(),
            tx: Vec::new(),
            rx: VecDeque::new(),
            dac,
            chip_select: GpioPin::CS0,
            buffer_enable: None,
            short_write: None,
            fail_writes_from: None,
            extra_response: 0,
            mute: false,
            no_echo: false,
            slave: Slave::default(),
        }
    }

    pub fn dac(&self) -> &DacModel {
        self.dac.as_ref().expect("channel without dac")
    }

    pub fn dac_mut(&mut self) -> &mut DacModel {
        self.dac.as_mut().expect("channel without dac")
    }

    fn port_value(&self, port: Port) -> u8 {
        match port {
            Port::Low => self.low.0,
            Port::High => self.high.0,
        }
    }

    fn pin_low(&self, pin: GpioPin) -> bool {
        self.port_value(pin.port()) & pin.mask() == 0
    }

    fn respond(&mut self, bytes: &[u8]) {
        if !self.mute {
            self.rx.extend(bytes);
        }
    }

    fn set_gpio(&mut self, port: Port, value: u8, dir: u8) {
        match port {
            Port::Low => self.low = (value, dir),
            Port::High => self.high = (value, dir),
        }
        self.gpio_writes.push((port, value, dir));

        let selected = self.pin_low(self.chip_select);
        if selected && !self.slave.selected {
            self.slave = Slave {
                selected: true,
                ..Slave::default()
            };
        } else if !selected {
            self.slave.selected = false;
        }
    }

    fn clock_byte(&mut self, mosi: u8) -> u8 {
        let buffer_open = self.buffer_enable.is_none_or(|pin| self.pin_low(pin));
        let slave = &mut self.slave;
        let Some(dac) = self.dac.as_mut() else {
            return 0xFF;
        };
        if !slave.selected || dac.absent {
            return 0xFF;
        }
        let index = slave.index;
        slave.index += 1;
        match index {
            0 => {
                slave.read = mosi & 0x80 != 0;
                slave.addr = ((mosi & 0x7F) as u16) << 8;
                0x00
            }
            1 => {
                slave.addr |= mosi as u16;
                0x00
            }
            n => {
                let addr = slave.addr + (n - 2) as u16;
                if slave.read {
                    let value = dac.read(addr);
                    if buffer_open { value } else { 0xFF }
                } else {
                    dac.write(addr, mosi);
                    0x00
                }
            }
        }
    }

    /// Run an MPSSE command stream.
    fn execute(&mut self, data: &[u8]) {
        assert_eq!(self.bitmode, BitMode::Mpsse, "MPSSE command outside of MPSSE mode");
        let mut i = 0;
        while i < data.len() {
            let opcode = data[i];
            i += 1;
            match opcode {
                SET_BITS_LOW | SET_BITS_HIGH => {
                    let port = if opcode == SET_BITS_LOW { Port::Low } else { Port::High };
                    self.set_gpio(port, data[i], data[i + 1]);
                    i += 2;
                }
                GET_BITS_LOW => {
                    let value = self.low.0;
                    self.respond(&[value]);
                }
                GET_BITS_HIGH => {
                    let value = self.high.0;
                    self.respond(&[value]);
                }
                LOOPBACK_START => self.loopback = true,
                LOOPBACK_END => self.loopback = false,
                TCK_DIVISOR => {
                    self.divisor = Some(u16::from_le_bytes([data[i], data[i + 1]]));
                    i += 2;
                }
                SEND_IMMEDIATE => {}
                DIS_DIV_5 => self.divide_by_5 = false,
                EN_DIV_5 => self.divide_by_5 = true,
                EN_3_PHASE => self.three_phase = true,
                DIS_3_PHASE => self.three_phase = false,
                EN_ADAPTIVE => self.adaptive = true,
                DIS_ADAPTIVE => self.adaptive = false,
                CLOCK_BYTES_INOUT => {
                    let len = u16::from_le_bytes([data[i], data[i + 1]]) as usize + 1;
                    i += 2;
                    let block = data[i..i + len].to_vec();
                    i += len;
                    let miso: Vec<u8> = block.iter().map(|b| self.clock_byte(*b)).collect();
                    self.respond(&miso);
                    let extra = vec![0xEE; self.extra_response];
                    self.respond(&extra);
                }
                bad => {
                    if !self.no_echo {
                        self.respond(&[BAD_COMMAND, bad]);
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimPort(pub Rc<RefCell<SimChannel>>);

impl SimPort {
    pub fn new(dac: Option<DacModel>) -> Self {
        Self(Rc::new(RefCell::new(SimChannel::new(dac))))
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, SimChannel> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, SimChannel> {
        self.0.borrow_mut()
    }
}

impl FtdiPort for SimPort {
    fn reset(&mut self) -> Result<()> {
        let mut ch = self.borrow_mut();
        ch.calls.push("reset".into());
        ch.rx.clear();
        Ok(())
    }

    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> Result<()> {
        let mut ch = self.borrow_mut();
        ch.calls.push(format!("bitmode {mask:#04x} {mode:?}"));
        ch.bitmode = mode;
        Ok(())
    }

    fn set_latency_timer(&mut self, ms: u8) -> Result<()> {
        let mut ch = self.borrow_mut();
        ch.calls.push(format!("latency {ms}"));
        ch.latency_ms = ms;
        Ok(())
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        let mut ch = self.borrow_mut();
        ch.calls.push(format!("flow {flow:?}"));
        ch.flow = flow;
        Ok(())
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        let mut ch = self.borrow_mut();
        ch.calls.push(format!("timeouts {}/{}", read.as_millis(), write.as_millis()));
        ch.timeouts = Some((read, write));
        Ok(())
    }

    fn purge(&mut self) -> Result<()> {
        let mut ch = self.borrow_mut();
        ch.calls.push("purge".into());
        ch.rx.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut ch = self.borrow_mut();
        ch.tx.push(data.to_vec());
        if ch.fail_writes_from.is_some_and(|first| ch.tx.len() > first) {
            return Err(afe_bias::Error::Timeout);
        }
        if let Some(limit) = ch.short_write {
            if data.len() > limit {
                return Ok(limit);
            }
        }
        ch.execute(data);
        Ok(data.len())
    }

    fn queue_status(&mut self) -> Result<usize> {
        Ok(self.borrow().rx.len())
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut ch = self.borrow_mut();
        let take = len.min(ch.rx.len());
        Ok(ch.rx.drain(..take).collect())
    }
}

/// A simulated FT2232H: data channel with the DAC attached, level-shifter channel.
pub fn sim_pair() -> (SimPort, SimPort) {
    (SimPort::new(Some(DacModel::default())), SimPort::new(None))
}

/// Bench configuration with the bias settle time kept short for property tests.
pub fn fast_config() -> BenchConfig {
    let mut config = BenchConfig::default();
    config.bias.settle = Duration::ZERO;
    config
}

pub fn open_bench(config: &BenchConfig) -> anyhow::Result<(Bench<SimPort>, SimPort, SimPort)> {
    let (primary, mirror) = sim_pair();
    let bench = Bench::from_ports(primary.clone(), Some(mirror.clone()), config)?;
    Ok((bench, primary, mirror))
}
