//! The bias bench: one bridge, one DAC, one device under test.

mod basic;
mod bias;
mod power;

use crate::hardware::afe_dac::{AfeDac, ChipIdentity, DacConfig};
use crate::spi::SpiConfig;
use crate::transport::TransportConfig;
use crate::usb::FtdiPort;
use afe_globals::SETTLE_TIME;
use std::time::Duration;

/// Codes at or above this value put the gate above −2.5 V in the −10 V range.
pub const MAX_DAC_CODE: u16 = 3072;

/// Successive-approximation step sizes, largest first.
pub const BIAS_SCHEDULE: [u16; 6] = [64, 32, 16, 8, 4, 2];

/// What the bias loop does with a candidate code outside `0..ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClampPolicy {
    /// Keep the present code and go on with the next step.
    #[default]
    Skip,
    /// Move to the nearest allowed code instead.
    Saturate,
    /// Stop the search with [`crate::Error::SafetyClamp`].
    Abort,
}

/// How the measured current responds to a rising DAC code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slope {
    #[default]
    Positive,
    Negative,
}

impl Slope {
    pub fn sign(&self) -> i32 {
        match self {
            Slope::Positive => 1,
            Slope::Negative => -1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BiasConfig {
    pub schedule: Vec<u16>,
    /// First forbidden code.
    pub ceiling: u16,
    /// Wait between a strobe and the following measurement.
    pub settle: Duration,
    pub clamp: ClampPolicy,
    pub slope: Slope,
    /// Shunt calibration: drain current in amperes per measured volt.
    pub amps_per_volt: f64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            schedule: BIAS_SCHEDULE.to_vec(),
            ceiling: MAX_DAC_CODE,
            settle: SETTLE_TIME,
            clamp: ClampPolicy::default(),
            slope: Slope::default(),
            amps_per_volt: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Applied,
    /// Candidate out of bounds, code left unchanged.
    Skipped,
    /// Candidate out of bounds, nearest allowed code applied.
    Saturated,
}

/// Record of one step of the bias search.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasStep {
    pub step: u16,
    pub candidate: i32,
    /// Code at the output after the step.
    pub code: u16,
    pub action: StepAction,
    /// Drain current measured after the step, in amperes.
    pub current: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasOutcome {
    pub target: f64,
    pub initial_code: u16,
    pub initial_current: f64,
    pub final_code: u16,
    pub final_current: f64,
    pub steps: Vec<BiasStep>,
}

impl BiasOutcome {
    /// Number of steps the safety clamp intervened in.
    pub fn clamped(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.action != StepAction::Applied)
            .count()
    }

    pub fn final_error(&self) -> f64 {
        (self.final_current - self.target).abs()
    }
}

/// Everything needed to bring up a bench.
#[derive(Debug, Clone, Default)]
pub struct BenchConfig {
    pub transport: TransportConfig,
    pub spi: SpiConfig,
    pub dac: DacConfig,
    pub bias: BiasConfig,
}

pub struct Bench<P: FtdiPort> {
    dac: AfeDac<P>,
    bias: BiasConfig,
    identity: ChipIdentity,
}
