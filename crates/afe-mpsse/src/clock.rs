use afe_globals::ftdi::{MPSSE_BASE_CLOCK, MPSSE_CLOCK_MAX, MPSSE_CLOCK_MIN};
use afe_globals::{Error, Result};

/// Divisor for `TCK_DIVISOR` that yields `freq_hz` with divide-by-5 disabled.
///
/// `divisor = floor(60 MHz / (2 * f)) - 1`. Frequencies outside 1 kHz..=30 MHz
/// are rejected.
pub fn clock_divisor(freq_hz: u32) -> Result<u16> {
    if !(MPSSE_CLOCK_MIN..=MPSSE_CLOCK_MAX).contains(&freq_hz) {
        log::error!("clock {freq_hz} Hz outside of {MPSSE_CLOCK_MIN}..={MPSSE_CLOCK_MAX} Hz");
        return Err(Error::Argument("clock frequency out of range"));
    }
    let divisor = MPSSE_BASE_CLOCK / (2 * freq_hz) - 1;
    // 1 kHz gives 29999, well inside u16
    Ok(divisor as u16)
}

/// Clock actually produced by `divisor`.
pub fn divisor_frequency(divisor: u16) -> u32 {
    MPSSE_BASE_CLOCK / (2 * (divisor as u32 + 1))
}
