use afe_bias::{Bench, BenchConfig};
use afe_globals::{DacChannel, DacRange};
use afe_mpsse::DacCode;
use anyhow::Result;

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .filter_module("nusb", log::LevelFilter::Info)
        .init();

    let mut bench = Bench::open(&BenchConfig::default())?;
    log::info!("DAC: {}", bench.identity());

    bench.initialize(DacRange::Minus10To0)?;

    // -6.5 V on every gate, well below pinch-off
    let preload = DacCode::new(0x599)?;
    bench.preload_gates(&DacChannel::ALL, preload)?;
    for channel in DacChannel::ALL {
        let code = bench.dac_mut().read_code(channel)?;
        log::info!(
            "{channel}: {code} ({:.3} V)",
            DacRange::Minus10To0.code_to_volts(code.value())
        );
    }

    bench.close()?;
    Ok(())
}
