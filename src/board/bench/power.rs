use crate::board::bench::Bench;
use crate::daq::PowerSequencer;
use crate::usb::FtdiPort;
use anyhow::Result;
use afe_globals::DacChannel;
use afe_mpsse::DacCode;

impl<P: FtdiPort> Bench<P> {
    /// VDD1 on, gates to `preload`, drains on.
    ///
    /// The DAC must already be initialized; the gates are pinched off before any
    /// drain voltage appears.
    pub fn bias_up<S: PowerSequencer>(
        &mut self,
        seq: &mut S,
        channels: &[DacChannel],
        preload: DacCode,
    ) -> Result<()> {
        log::info!("power up: VDD1");
        seq.set_vdd1(true)?;
        log::info!("power up: gates to {preload}");
        self.preload_gates(channels, preload)?;
        log::info!("power up: drains");
        seq.set_drains(true)
    }

    /// Drains off, gates back to `preload`, VDD1 off.
    pub fn bias_down<S: PowerSequencer>(
        &mut self,
        seq: &mut S,
        channels: &[DacChannel],
        preload: DacCode,
    ) -> Result<()> {
        log::info!("power down: drains");
        seq.set_drains(false)?;
        log::info!("power down: gates to {preload}");
        self.preload_gates(channels, preload)?;
        log::info!("power down: VDD1");
        seq.set_vdd1(false)
    }
}
