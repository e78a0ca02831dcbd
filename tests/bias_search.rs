mod common;

use crate::common::*;

use afe_bias::{
    BIAS_SCHEDULE, BenchConfig, ClampPolicy, DacChannel, DacRange, Error, MAX_DAC_CODE, Slope,
    StepAction,
};
use afe_mpsse::DacCode;
use anyhow::{Result, anyhow};
use std::time::Duration;

/// Drain current of the device under test as seen by the DAQ, from the live code of `channel`.
fn meter(
    port: &SimPort,
    channel: DacChannel,
    current: impl Fn(u16) -> f64,
) -> impl FnMut(u32) -> Result<f64> {
    let port = port.clone();
    move |_daq_channel| Ok(current(port.borrow().dac().live[channel.index()]))
}

/// Pinched off at 3072 and 0.1 mA more per code below it.
fn pinch_off(code: u16) -> f64 {
    (MAX_DAC_CODE as f64 - code as f64) * 1e-4
}

fn linear(code: u16) -> f64 {
    code as f64 * 1e-4
}

fn assert_below_ceiling(port: &SimPort) {
    let sim = port.borrow();
    for (channel, code) in &sim.dac().shadow_history {
        assert!(*code < MAX_DAC_CODE, "{channel} staged {code}");
    }
    for live in &sim.dac().live_history {
        assert!(live.iter().all(|code| *code < MAX_DAC_CODE), "{live:?}");
    }
}

#[test]
fn converges_on_drain_current() -> Result<()> {
    logging_init("bias_search");
    let mut config = BenchConfig::default();
    config.bias.slope = Slope::Negative;
    let (mut bench, primary, _) = open_bench(&config)?;
    bench.initialize(DacRange::Minus10To0)?;

    let port = primary.clone();
    let mut daq = move |daq_channel: u32| -> Result<f64> {
        assert_eq!(daq_channel, 3);
        let sim = port.borrow();
        let strobe = sim.dac().last_strobe.ok_or(anyhow!("measured before any strobe"))?;
        assert!(strobe.elapsed() >= Duration::from_millis(100));
        Ok(pinch_off(sim.dac().live[DacChannel::A0.index()]))
    };

    let outcome = bench.adjust_gate(&mut daq, DacChannel::A0, 2990, 3, 0.020)?;
    log::debug!("{outcome:#?}");

    assert_eq!(outcome.initial_code, 2990);
    assert!((outcome.initial_current - 0.0082).abs() < 1e-9);
    assert_eq!(outcome.steps.len(), BIAS_SCHEDULE.len());
    let codes: Vec<u16> = outcome.steps.iter().map(|step| step.code).collect();
    assert_eq!(codes, vec![2926, 2894, 2878, 2870, 2874, 2872]);
    assert!(outcome.final_code.abs_diff(2872) <= 2);
    assert!(outcome.final_error() < 1e-6);
    assert_eq!(outcome.clamped(), 0);

    assert_eq!(primary.borrow().dac().live[DacChannel::A0.index()], outcome.final_code);
    assert_eq!(
        bench.dac().channel_state(DacChannel::A0).live,
        Some(DacCode::new(outcome.final_code)?)
    );
    assert_below_ceiling(&primary);
    bench.close()?;
    Ok(())
}

#[test]
fn skip_keeps_code_below_ceiling() -> Result<()> {
    logging_init("bias_search");
    let (mut bench, primary, _) = open_bench(&fast_config())?;
    let mut daq = meter(&primary, DacChannel::B0, linear);

    // unreachable target pushes against the ceiling on every step
    let outcome = bench.adjust_gate(&mut daq, DacChannel::B0, 3050, 0, 1.0)?;
    let actions: Vec<StepAction> = outcome.steps.iter().map(|step| step.action).collect();
    assert_eq!(
        actions,
        vec![
            StepAction::Skipped,
            StepAction::Skipped,
            StepAction::Applied,
            StepAction::Skipped,
            StepAction::Applied,
            StepAction::Skipped,
        ]
    );
    assert_eq!(outcome.steps[0].candidate, 3114);
    assert_eq!(outcome.final_code, 3070);
    assert_eq!(outcome.clamped(), 4);
    assert_below_ceiling(&primary);
    bench.close()?;
    Ok(())
}

#[test]
fn skip_never_goes_negative() -> Result<()> {
    logging_init("bias_search");
    let (mut bench, primary, _) = open_bench(&fast_config())?;
    let mut daq = meter(&primary, DacChannel::A3, linear);

    let outcome = bench.adjust_gate(&mut daq, DacChannel::A3, 10, 0, 0.0)?;
    let codes: Vec<u16> = outcome.steps.iter().map(|step| step.code).collect();
    assert_eq!(codes, vec![10, 10, 10, 2, 2, 0]);
    assert_eq!(outcome.steps[0].candidate, -54);
    assert_eq!(outcome.clamped(), 4);
    bench.close()?;
    Ok(())
}

#[test]
fn saturate_moves_to_last_allowed_code() -> Result<()> {
    logging_init("bias_search");
    let mut config = fast_config();
    config.bias.clamp = ClampPolicy::Saturate;
    let (mut bench, primary, _) = open_bench(&config)?;
    let mut daq = meter(&primary, DacChannel::A1, linear);

    let outcome = bench.adjust_gate(&mut daq, DacChannel::A1, 3050, 0, 1.0)?;
    assert_eq!(outcome.steps[0].action, StepAction::Saturated);
    assert_eq!(outcome.steps[0].code, MAX_DAC_CODE - 1);
    assert_eq!(outcome.final_code, MAX_DAC_CODE - 1);
    assert_below_ceiling(&primary);
    bench.close()?;
    Ok(())
}

#[test]
fn abort_reports_refused_code() -> Result<()> {
    logging_init("bias_search");
    let mut config = fast_config();
    config.bias.clamp = ClampPolicy::Abort;
    let (mut bench, primary, _) = open_bench(&config)?;
    let mut daq = meter(&primary, DacChannel::A1, linear);

    let err = bench
        .adjust_gate(&mut daq, DacChannel::A1, 3050, 0, 1.0)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::SafetyClamp { code: 3114 })
    ));
    assert_eq!(primary.borrow().dac().live[DacChannel::A1.index()], 3050);
    assert_below_ceiling(&primary);
    bench.close()?;
    Ok(())
}

#[test]
fn initial_code_at_ceiling_refused() -> Result<()> {
    logging_init("bias_search");
    let (mut bench, primary, _) = open_bench(&fast_config())?;
    let mut daq = meter(&primary, DacChannel::A0, linear);

    for initial in [MAX_DAC_CODE, 0x0FFF] {
        let err = bench
            .adjust_gate(&mut daq, DacChannel::A0, initial, 0, 0.1)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Argument(_))));
    }
    assert!(primary.borrow().dac().shadow_history.is_empty());
    bench.close()?;
    Ok(())
}

#[test]
fn successive_approximation_bound() -> Result<()> {
    logging_init("bias_search");
    let (mut bench, primary, _) = open_bench(&fast_config())?;
    let mut daq = meter(&primary, DacChannel::A2, linear);

    for initial in [300u16, 1433, 2500] {
        for offset in (-128i32..=128).step_by(7).chain([-2, -1, 0, 1, 2, 128]) {
            let goal = (initial as i32 + offset) as u16;
            let outcome = bench.adjust_gate(&mut daq, DacChannel::A2, initial, 0, linear(goal))?;

            for step in &outcome.steps {
                let error = (step.code as i32 - goal as i32).unsigned_abs();
                assert!(error <= step.step as u32, "{initial} -> {goal}: {step:?}");
            }
            let error = (outcome.final_code as i32 - goal as i32).unsigned_abs();
            assert!(error <= 2, "{initial} -> {goal}: ended at {}", outcome.final_code);
            if offset.unsigned_abs() >= 2 {
                assert!(error <= offset.unsigned_abs());
            }
        }
    }

    // far targets only get closer
    for (initial, goal) in [(1000u16, 1500u16), (2000, 100)] {
        let outcome = bench.adjust_gate(&mut daq, DacChannel::A2, initial, 0, linear(goal))?;
        let moved = initial.abs_diff(outcome.final_code);
        assert_eq!(moved, BIAS_SCHEDULE.iter().sum::<u16>());
        assert!(outcome.final_code.abs_diff(goal) < initial.abs_diff(goal));
    }
    bench.close()?;
    Ok(())
}

#[test]
fn by_register_name() -> Result<()> {
    logging_init("bias_search");
    let (mut bench, primary, _) = open_bench(&fast_config())?;
    let mut daq = meter(&primary, DacChannel::A1, linear);

    let outcome = bench.adjust_gate_by_name(&mut daq, "DACA1", 1000, 0, linear(1040))?;
    assert!(outcome.final_code.abs_diff(1040) <= 2);
    assert_eq!(primary.borrow().dac().live[DacChannel::A1.index()], outcome.final_code);

    assert!(bench.adjust_gate_by_name(&mut daq, "DACC9", 1000, 0, 0.1).is_err());
    bench.close()?;
    Ok(())
}

#[test]
fn daq_failure_propagates() -> Result<()> {
    logging_init("bias_search");
    let (mut bench, _, _) = open_bench(&fast_config())?;
    let mut calls = 0;
    let mut daq = |_: u32| -> Result<f64> {
        calls += 1;
        if calls == 3 {
            return Err(anyhow!("daq offline"));
        }
        Ok(0.0)
    };

    let err = bench
        .adjust_gate(&mut daq, DacChannel::A0, 1000, 0, 0.1)
        .unwrap_err();
    assert_eq!(err.to_string(), "daq offline");
    bench.close()?;
    Ok(())
}

#[test]
fn verify_failure_stops_search() -> Result<()> {
    logging_init("bias_search");
    let (mut bench, primary, _) = open_bench(&fast_config())?;
    let port = primary.clone();
    let mut daq = move |_: u32| -> Result<f64> {
        // the data register sticks after the first sample
        port.borrow_mut()
            .dac_mut()
            .stuck
            .insert(DacChannel::A0.data_lo().addr(), 0x00);
        Ok(0.0)
    };

    let err = bench
        .adjust_gate(&mut daq, DacChannel::A0, 1000, 0, 0.1)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::RegisterVerify { .. })
    ));
    Ok(())
}
