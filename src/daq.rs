//! Collaborators outside of the bias driver.
//!
//! The bench only needs two things from the rest of the test setup: a voltmeter
//! channel that observes the drain current through a shunt, and a way to switch
//! the supplies in the right order around the gate bias.

/// A DAQ channel reader.
pub trait VoltageMeter {
    /// Measure `channel` in volts.
    fn measure_voltage(&mut self, channel: u32) -> anyhow::Result<f64>;
}

impl<F> VoltageMeter for F
where
    F: FnMut(u32) -> anyhow::Result<f64>,
{
    fn measure_voltage(&mut self, channel: u32) -> anyhow::Result<f64> {
        self(channel)
    }
}

/// Programmable supplies of the device under test.
pub trait PowerSequencer {
    fn set_vdd1(&mut self, on: bool) -> anyhow::Result<()>;
    fn set_drains(&mut self, on: bool) -> anyhow::Result<()>;
}
