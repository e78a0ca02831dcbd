use crate::board::bench::{Bench, BenchConfig, BiasConfig};
use crate::hardware::afe_dac::{AfeDac, ChipIdentity};
use crate::spi::SpiBridge;
use crate::transport::Mpsse;
use crate::usb::FtdiPort;
use anyhow::Result;
use afe_globals::{DacChannel, DacGroup, DacRange};
use afe_mpsse::DacCode;

#[cfg(feature = "nusb")]
impl Bench<crate::usb::FtdiChannel> {
    /// Opens the adapter selected by `config.transport`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use afe_bias::board::bench::{Bench, BenchConfig};
    /// let bench = Bench::open(&BenchConfig::default())?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn open(config: &BenchConfig) -> Result<Self> {
        let mut opener = crate::opener::Opener::new();
        let (primary, mirror) = opener.open(&config.transport)?;
        opener.close();
        Self::from_ports(primary, mirror, config)
    }
}

impl<P: FtdiPort> Bench<P> {
    /// Bring up transport, SPI bridge and DAC driver on already claimed channels.
    ///
    /// The identity registers must be readable, otherwise the DAC is considered
    /// unresponsive. Whatever fails, the bridge is left idle and out of MPSSE mode.
    pub fn from_ports(primary: P, mirror: Option<P>, config: &BenchConfig) -> Result<Self> {
        let mpsse = Mpsse::open(primary, mirror, &config.transport)?;
        let spi = SpiBridge::new(mpsse, config.spi.clone())?;
        let mut dac = AfeDac::new(spi, config.dac.clone());
        let identity = match dac.identity() {
            Ok(identity) => identity,
            Err(e) => {
                if let Err(close) = dac.close() {
                    log::error!("closing bench after failed identity read: {close}");
                }
                return Err(e.into());
            }
        };
        Ok(Self {
            dac,
            bias: config.bias.clone(),
            identity,
        })
    }

    pub fn identity(&self) -> ChipIdentity {
        self.identity
    }

    pub fn dac(&self) -> &AfeDac<P> {
        &self.dac
    }

    pub fn dac_mut(&mut self) -> &mut AfeDac<P> {
        &mut self.dac
    }

    pub fn bias_config(&self) -> &BiasConfig {
        &self.bias
    }

    pub fn bias_config_mut(&mut self) -> &mut BiasConfig {
        &mut self.bias
    }

    /// Reference on, `range` on every channel, every channel powered, strobe.
    pub fn initialize(&mut self, range: DacRange) -> Result<()> {
        log::debug!("[*] Init - Enable internal reference");
        self.dac.enable_reference()?;
        log::debug!("[*] Init - Output range {range:?}");
        self.dac.set_range(DacGroup::A, range)?;
        self.dac.set_range(DacGroup::B, range)?;
        log::debug!("[*] Init - Power all DAC channels");
        self.dac.power_dacs(0xFF)?;
        self.dac.update()?;
        Ok(())
    }

    /// Load `code` into every channel of `channels` and strobe.
    ///
    /// Runs of consecutive channels go out as one burst.
    pub fn preload_gates(&mut self, channels: &[DacChannel], code: DacCode) -> Result<()> {
        let mut sorted: Vec<DacChannel> = channels.to_vec();
        sorted.sort_by_key(DacChannel::index);
        sorted.dedup();

        let mut run_start = 0;
        for i in 1..=sorted.len() {
            let run_ends =
                i == sorted.len() || sorted[i].index() != sorted[i - 1].index() + 1;
            if run_ends {
                let run = &sorted[run_start..i];
                log::debug!("preload {} channel(s) from {} with {code}", run.len(), run[0]);
                self.dac.stage_codes(run[0], &vec![code; run.len()])?;
                run_start = i;
            }
        }
        self.dac.update()?;
        Ok(())
    }

    /// Return the bridge to idle and release the adapter.
    pub fn close(&mut self) -> Result<()> {
        self.dac.close()?;
        Ok(())
    }
}
