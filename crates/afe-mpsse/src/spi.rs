//! Layout of SPI transactions as MPSSE command streams (mode 0, MSB first).
//!
//! A transaction is assembled from these fragments, in order:
//!
//! 1. chip-select asserted three times (settling before the first clock)
//! 2. the payload as one `0x34` block, or for buffered 3-wire reads the write
//!    part, three buffer-enable repetitions, the read part and two
//!    buffer-disable repetitions
//! 3. optionally a trigger pulse: trigger asserted three times, then released
//! 4. optionally chip-select held five more times and released once
//! 5. `SEND_IMMEDIATE`

use crate::command::MpsseCommand;
use afe_globals::{GpioPin, Port, Result};

pub const CS_SETUP_REPEAT: usize = 3;
pub const CS_HOLD_REPEAT: usize = 5;
pub const TRIGGER_REPEAT: usize = 3;
pub const BUFFER_ENABLE_REPEAT: usize = 3;
pub const BUFFER_DISABLE_REPEAT: usize = 2;

/// Value and direction of one GPIO byte-port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortState {
    pub value: u8,
    pub dir: u8,
}

impl PortState {
    pub fn new(value: u8, dir: u8) -> Self {
        Self { value, dir }
    }
}

/// A GPIO line with its active polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub pin: GpioPin,
    pub active_low: bool,
}

impl Line {
    pub fn active_low(pin: GpioPin) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }

    pub fn active_high(pin: GpioPin) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    fn drive(&self, state: &mut PortState, active: bool) {
        let mask = self.pin.mask();
        state.dir |= mask;
        if active != self.active_low {
            state.value |= mask;
        } else {
            state.value &= !mask;
        }
    }
}

/// Everything needed to lay out transactions on one chip-select.
#[derive(Debug, Clone)]
pub struct SpiLayout {
    /// Idle state of the low and high byte-ports.
    pub idle: [PortState; 2],
    pub chip_select: Line,
    pub trigger: Option<Line>,
    pub buffer_enable: Line,
    /// Assert chip-select before the first clock.
    pub open_cs: bool,
    /// Release chip-select after the last clock.
    pub close_cs: bool,
}

fn port_index(port: Port) -> usize {
    match port {
        Port::Low => 0,
        Port::High => 1,
    }
}

impl SpiLayout {
    /// A layout for `chip_select` with the default active-low buffer enable on AC0.
    pub fn new(idle: [PortState; 2], chip_select: GpioPin) -> Self {
        Self {
            idle,
            chip_select: Line::active_low(chip_select),
            trigger: None,
            buffer_enable: Line::active_low(GpioPin::AC0),
            open_cs: true,
            close_cs: true,
        }
    }

    /// Port states with every line in `asserted` active and every line in
    /// `released` inactive. The other pins stay idle.
    pub fn levels(&self, asserted: &[Line], released: &[Line]) -> [PortState; 2] {
        let mut ports = self.idle;
        for line in released {
            line.drive(&mut ports[port_index(line.pin.port())], false);
        }
        for line in asserted {
            line.drive(&mut ports[port_index(line.pin.port())], true);
        }
        ports
    }

    /// Emit `repeat` GPIO writes on every port touched by the given lines.
    fn emit(&self, cmd: &mut MpsseCommand, asserted: &[Line], released: &[Line], repeat: usize) {
        let ports = self.levels(asserted, released);
        let mut touched = [false; 2];
        for line in asserted.iter().chain(released) {
            touched[port_index(line.pin.port())] = true;
        }
        for _ in 0..repeat {
            for (index, port) in [Port::Low, Port::High].into_iter().enumerate() {
                if touched[index] {
                    cmd.set_bits(port, ports[index].value, ports[index].dir);
                }
            }
        }
    }

    fn open(&self, cmd: &mut MpsseCommand) {
        if self.open_cs {
            self.emit(cmd, &[self.chip_select], &[], CS_SETUP_REPEAT);
        }
    }

    fn finish(&self, cmd: &mut MpsseCommand) {
        if let Some(trigger) = self.trigger {
            self.emit(cmd, &[self.chip_select, trigger], &[], TRIGGER_REPEAT);
            self.emit(cmd, &[self.chip_select], &[trigger], 1);
        }
        if self.close_cs {
            self.emit(cmd, &[self.chip_select], &[], CS_HOLD_REPEAT);
            self.emit(cmd, &[], &[self.chip_select], 1);
        }
        cmd.send_immediate();
    }

    /// Four-wire transaction clocking `payload` as a single block.
    pub fn four_wire(&self, payload: &[u8]) -> Result<MpsseCommand> {
        let mut cmd = MpsseCommand::new();
        self.open(&mut cmd);
        cmd.clock_bytes(payload)?;
        self.finish(&mut cmd);
        Ok(cmd)
    }

    /// Three-wire transaction through an external bidirectional buffer.
    ///
    /// `write` is clocked with the buffer disabled, then the buffer is turned
    /// around and `read_len` zero bytes are clocked while the slave drives the
    /// shared data line.
    pub fn three_wire(&self, write: &[u8], read_len: usize) -> Result<MpsseCommand> {
        let mut cmd = MpsseCommand::new();
        self.open(&mut cmd);
        cmd.clock_bytes(write)?;
        self.emit(
            &mut cmd,
            &[self.chip_select, self.buffer_enable],
            &[],
            BUFFER_ENABLE_REPEAT,
        );
        cmd.clock_bytes(&vec![0u8; read_len])?;
        self.emit(
            &mut cmd,
            &[self.chip_select],
            &[self.buffer_enable],
            BUFFER_DISABLE_REPEAT,
        );
        self.finish(&mut cmd);
        Ok(cmd)
    }
}
