//! SPI bridge on top of the MPSSE transport (mode 0, MSB first).

use crate::transport::Mpsse;
use crate::usb::FtdiPort;
use crate::{Error, Result};
use afe_globals::{GpioPin, QUEUE_POLL_LIMIT};
use afe_mpsse::{Line, MpsseCommand, SpiLayout};

/// How register contents travel back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Separate MOSI and MISO lines.
    #[default]
    FourWire,
    /// Shared data line; an external bidirectional buffer is turned around
    /// between the address and the data phase.
    ThreeWireBuffered,
}

#[derive(Debug, Clone)]
pub struct SpiConfig {
    pub chip_select: GpioPin,
    /// Line pulsed after the payload when a transaction asks for it.
    pub trigger: Option<GpioPin>,
    pub read_mode: ReadMode,
    pub buffer_enable: GpioPin,
    pub buffer_active_low: bool,
    pub poll_limit: usize,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            chip_select: GpioPin::CS0,
            trigger: None,
            read_mode: ReadMode::default(),
            buffer_enable: GpioPin::AC0,
            buffer_active_low: true,
            poll_limit: QUEUE_POLL_LIMIT,
        }
    }
}

/// One request/response exchange on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiTransaction<'a> {
    pub tx: &'a [u8],
    /// Bytes clocked in after `tx`. Zero for plain writes.
    pub read_len: usize,
    pub trigger: bool,
    pub open_cs: bool,
    pub close_cs: bool,
}

impl<'a> SpiTransaction<'a> {
    pub fn write(tx: &'a [u8]) -> Self {
        Self {
            tx,
            read_len: 0,
            trigger: false,
            open_cs: true,
            close_cs: true,
        }
    }

    pub fn read(header: &'a [u8], len: usize) -> Self {
        Self {
            read_len: len,
            ..Self::write(header)
        }
    }

    pub fn with_trigger(mut self) -> Self {
        self.trigger = true;
        self
    }

    /// Leave chip-select asserted after the last clock.
    pub fn keep_selected(mut self) -> Self {
        self.close_cs = false;
        self
    }

    /// Skip the chip-select setup, for continuing a transaction left selected.
    pub fn continued(mut self) -> Self {
        self.open_cs = false;
        self
    }

    /// Bytes the device clocks back, which is every byte on the bus.
    pub fn response_len(&self) -> usize {
        self.tx.len() + self.read_len
    }
}

/// SPI master on the data channel of an MPSSE transport.
pub struct SpiBridge<P: FtdiPort> {
    mpsse: Mpsse<P>,
    config: SpiConfig,
}

impl<P: FtdiPort> SpiBridge<P> {
    /// Claim the lines of `config` on `mpsse`.
    ///
    /// On error the transport is closed before it is dropped.
    pub fn new(mut mpsse: Mpsse<P>, config: SpiConfig) -> Result<Self> {
        if let Err(e) = Self::validate(&config).and_then(|_| Self::claim(&mut mpsse, &config)) {
            if let Err(close) = mpsse.close() {
                log::error!("closing transport after failed SPI setup: {close}");
            }
            return Err(e);
        }
        Ok(Self { mpsse, config })
    }

    fn validate(config: &SpiConfig) -> Result<()> {
        let selectable = |pin: GpioPin| GpioPin::selectable().any(|p| p == pin);
        if !selectable(config.chip_select) {
            return Err(Error::Argument("chip-select must be one of AD3..AD7, AC0..AC7"));
        }
        if let Some(trigger) = config.trigger {
            if !selectable(trigger) || trigger == config.chip_select {
                return Err(Error::Argument("trigger must be a free GPIO line"));
            }
        }
        if config.read_mode == ReadMode::ThreeWireBuffered {
            let buffer_enable = config.buffer_enable;
            if !selectable(buffer_enable)
                || buffer_enable == config.chip_select
                || config.trigger == Some(buffer_enable)
            {
                return Err(Error::Argument("buffer enable must be a free GPIO line"));
            }
        }
        Ok(())
    }

    fn claim(mpsse: &mut Mpsse<P>, config: &SpiConfig) -> Result<()> {
        log::debug!("[*] Init - SPI chip-select on {}", config.chip_select);
        mpsse.claim_output(config.chip_select, true)?;
        if let Some(trigger) = config.trigger {
            log::debug!("[*] Init - SPI trigger on {trigger}");
            mpsse.claim_output(trigger, false)?;
        }
        if config.read_mode == ReadMode::ThreeWireBuffered {
            log::debug!("[*] Init - SPI buffer enable on {}", config.buffer_enable);
            mpsse.claim_output(config.buffer_enable, config.buffer_active_low)?;
        }
        mpsse.set_poll_limit(config.poll_limit);
        Ok(())
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    pub fn transport(&self) -> &Mpsse<P> {
        &self.mpsse
    }

    pub fn transport_mut(&mut self) -> &mut Mpsse<P> {
        &mut self.mpsse
    }

    fn layout(&self, transaction: &SpiTransaction) -> Result<SpiLayout> {
        let mut layout = SpiLayout::new(self.mpsse.idle(), self.config.chip_select);
        layout.buffer_enable = Line {
            pin: self.config.buffer_enable,
            active_low: self.config.buffer_active_low,
        };
        layout.open_cs = transaction.open_cs;
        layout.close_cs = transaction.close_cs;
        if transaction.trigger {
            let pin = self
                .config
                .trigger
                .ok_or(Error::Argument("no trigger line configured"))?;
            layout.trigger = Some(Line::active_high(pin));
        }
        Ok(layout)
    }

    /// Build the command stream of `transaction` without sending it.
    pub fn command(&self, transaction: &SpiTransaction) -> Result<MpsseCommand> {
        let layout = self.layout(transaction)?;
        let cmd = match (self.config.read_mode, transaction.read_len) {
            (ReadMode::ThreeWireBuffered, read_len) if read_len > 0 => {
                layout.three_wire(transaction.tx, read_len)?
            }
            (_, read_len) => {
                let mut payload = transaction.tx.to_vec();
                payload.resize(transaction.tx.len() + read_len, 0);
                layout.four_wire(&payload)?
            }
        };
        Ok(cmd)
    }

    /// Run `transaction` and return every byte clocked in, header included.
    pub fn execute(&mut self, transaction: &SpiTransaction) -> Result<Vec<u8>> {
        let cmd = self.command(transaction)?;
        log::trace!("SPI tx {:02x?} + {} read", transaction.tx, transaction.read_len);
        let response = self.mpsse.transact(&cmd)?;
        if response.len() != transaction.response_len() {
            return Err(Error::Desync {
                expected: transaction.response_len(),
                actual: response.len(),
            });
        }
        Ok(response)
    }

    /// Full-duplex transfer of `payload`.
    pub fn transfer(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.execute(&SpiTransaction::write(payload))
    }

    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        self.transfer(payload).map(|_| ())
    }

    /// Clock `header` out and return the `len` bytes that follow it.
    pub fn read(&mut self, header: &[u8], len: usize) -> Result<Vec<u8>> {
        if len < 1 {
            return Err(Error::Argument("read length must be at least 1"));
        }
        let response = self.execute(&SpiTransaction::read(header, len))?;
        Ok(response[header.len()..].to_vec())
    }

    pub fn close(&mut self) -> Result<()> {
        self.mpsse.close()
    }
}
