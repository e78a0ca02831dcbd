use crate::board::bench::{Bench, BiasOutcome, BiasStep, ClampPolicy, StepAction};
use crate::daq::VoltageMeter;
use crate::usb::FtdiPort;
use crate::Error;
use anyhow::Result;
use afe_globals::DacChannel;
use afe_mpsse::DacCode;

/// +1 for zero and positive values, so that a sample sitting exactly on the target
/// still moves the search.
fn sign(value: f64) -> i32 {
    if value < 0.0 { -1 } else { 1 }
}

impl<P: FtdiPort> Bench<P> {
    /// Strobe `code` onto `channel`, let it settle and measure the drain current.
    fn apply_and_measure<M: VoltageMeter>(
        &mut self,
        meter: &mut M,
        channel: DacChannel,
        code: u16,
        daq_channel: u32,
    ) -> Result<f64> {
        self.dac.stage_code(channel, DacCode::new(code)?)?;
        self.dac.update()?;
        std::thread::sleep(self.bias.settle);
        let volts = meter.measure_voltage(daq_channel)?;
        Ok(volts * self.bias.amps_per_volt)
    }

    /// Drive `channel` so that the drain current observed on `daq_channel`
    /// approaches `target` amperes.
    ///
    /// Starts at `initial_code` and walks the step schedule once. The direction of
    /// every step follows the sign of the remaining error; codes outside
    /// `0..ceiling` are never written.
    pub fn adjust_gate<M: VoltageMeter>(
        &mut self,
        meter: &mut M,
        channel: DacChannel,
        initial_code: u16,
        daq_channel: u32,
        target: f64,
    ) -> Result<BiasOutcome> {
        let ceiling = self.bias.ceiling;
        if initial_code >= ceiling {
            return Err(Error::Argument("initial gate code at or above the safety ceiling").into());
        }

        let mut code = initial_code;
        let mut current = self.apply_and_measure(meter, channel, code, daq_channel)?;
        log::debug!("bias {channel}: start at code {code}, {current:.6} A, target {target:.6} A");

        let mut outcome = BiasOutcome {
            target,
            initial_code,
            initial_current: current,
            final_code: code,
            final_current: current,
            steps: Vec::with_capacity(self.bias.schedule.len()),
        };

        let schedule = self.bias.schedule.clone();
        for step in schedule {
            let direction = sign(target - current) * self.bias.slope.sign();
            let candidate = code as i32 + direction * step as i32;

            let (next, action) = if (0..ceiling as i32).contains(&candidate) {
                (candidate as u16, StepAction::Applied)
            } else {
                log::warn!("bias {channel}: safety clamp, candidate code {candidate} refused");
                match self.bias.clamp {
                    ClampPolicy::Skip => {
                        outcome.steps.push(BiasStep {
                            step,
                            candidate,
                            code,
                            action: StepAction::Skipped,
                            current,
                        });
                        continue;
                    }
                    ClampPolicy::Saturate => {
                        let nearest = candidate.clamp(0, ceiling as i32 - 1) as u16;
                        (nearest, StepAction::Saturated)
                    }
                    ClampPolicy::Abort => {
                        return Err(Error::SafetyClamp { code: candidate }.into());
                    }
                }
            };

            code = next;
            current = self.apply_and_measure(meter, channel, code, daq_channel)?;
            log::trace!("bias {channel}: step {step} -> code {code}, {current:.6} A");
            outcome.steps.push(BiasStep {
                step,
                candidate,
                code,
                action,
                current,
            });
        }

        outcome.final_code = code;
        outcome.final_current = current;
        log::debug!(
            "bias {channel}: done at code {code}, {current:.6} A ({} clamp events)",
            outcome.clamped()
        );
        Ok(outcome)
    }

    /// [`Bench::adjust_gate`] with the channel given by its register-map name.
    pub fn adjust_gate_by_name<M: VoltageMeter>(
        &mut self,
        meter: &mut M,
        dac_name: &str,
        initial_code: u16,
        daq_channel: u32,
        target: f64,
    ) -> Result<BiasOutcome> {
        let channel: DacChannel = dac_name.parse()?;
        self.adjust_gate(meter, channel, initial_code, daq_channel, target)
    }
}
