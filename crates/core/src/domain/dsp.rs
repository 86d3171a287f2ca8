//! Numeric helpers shared by the engine, the instance and the diagnostics
//!
//! Everything here is pure and allocation-free, so it can be called from the
//! audio thread.

/// Level used in place of `-inf` when converting silence to dB
pub const SILENCE_DB: f32 = -120.0;

/// Converts a base-2 logarithm to decibels: `20 * log10(2)`
pub const LOG2_TO_DB: f32 = 6.020_599_9;

/// Inputs quieter than this are ignored by [`max_db_increase`]
pub const GAIN_DIAGNOSTIC_FLOOR: f32 = 1e-6;

/// Convert decibels to a linear amplitude factor
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear amplitude factor to decibels, floored at [`SILENCE_DB`]
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 1e-6 {
        SILENCE_DB
    } else {
        20.0 * gain.log10()
    }
}

/// Approximate `log2(x)` for positive, normal `x`
///
/// Splits the float into exponent and mantissa and evaluates a quartic on the
/// mantissa. Absolute error stays below 2e-4 over the normal range.
#[inline]
pub fn fast_log2(x: f32) -> f32 {
    let bits = x.to_bits();
    let exponent = ((bits >> 23) & 0xff) as i32 - 127;
    // Mantissa remapped into [1, 2)
    let m = f32::from_bits((bits & 0x007f_ffff) | 0x3f80_0000);
    let ln_m = -1.741_793_9 + (2.821_202_6 + (-1.469_956_8 + (0.447_179_55 - 0.056_570_851 * m) * m) * m) * m;
    exponent as f32 + ln_m * std::f32::consts::LOG2_E
}

/// Largest gain, in dB, that a block applied to any non-silent input sample
///
/// Samples whose input magnitude is below [`GAIN_DIAGNOSTIC_FLOOR`] are
/// skipped. Returns `f32::NEG_INFINITY` when every sample was skipped.
pub fn max_db_increase(input: &[f32], output: &[f32]) -> f32 {
    let largest_ratio = input
        .iter()
        .zip(output)
        .filter(|(x, _)| x.abs() >= GAIN_DIAGNOSTIC_FLOOR)
        .map(|(x, y)| y.abs() / x.abs())
        .fold(0.0_f32, f32::max);

    if largest_ratio == 0.0 {
        f32::NEG_INFINITY
    } else {
        LOG2_TO_DB * fast_log2(largest_ratio)
    }
}

/// One-pole smoothing coefficient for a time constant in milliseconds
///
/// A zero time constant yields 0.0, i.e. the smoother follows its target
/// instantly.
#[inline]
pub fn time_constant_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let samples = time_ms * sample_rate / 1000.0;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_conversions() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-6.0) - 0.501).abs() < 1e-3);
        assert!((gain_to_db(1.0)).abs() < 1e-6);
        assert_eq!(gain_to_db(0.0), SILENCE_DB);
    }

    #[test]
    fn test_fast_log2_accuracy() {
        for &x in &[1e-5_f32, 0.01, 0.3, 0.5, 1.0, 1.5, 2.0, 3.7, 8.0, 1000.0] {
            let approx = fast_log2(x);
            let exact = x.log2();
            assert!(
                (approx - exact).abs() < 2e-4,
                "fast_log2({}) = {}, expected {}",
                x,
                approx,
                exact
            );
        }
    }

    #[test]
    fn test_max_db_increase_skips_floor() {
        let input = [1e-7, 0.5];
        let output = [1e-7, 1.0];

        let db = max_db_increase(&input, &output);
        assert!((db - 6.0206).abs() < 0.01, "got {}", db);
    }

    #[test]
    fn test_max_db_increase_silence() {
        assert_eq!(max_db_increase(&[0.0, 0.0], &[0.0, 0.0]), f32::NEG_INFINITY);
        assert_eq!(max_db_increase(&[], &[]), f32::NEG_INFINITY);
    }

    #[test]
    fn test_max_db_increase_attenuation() {
        let input = [0.8, -0.8, 0.4];
        let output = [0.4, -0.4, 0.2];

        let db = max_db_increase(&input, &output);
        assert!((db + 6.0206).abs() < 0.01, "got {}", db);
    }

    #[test]
    fn test_time_constant_coeff() {
        assert_eq!(time_constant_coeff(0.0, 48000.0), 0.0);
        let coeff = time_constant_coeff(10.0, 48000.0);
        assert!(coeff > 0.99 && coeff < 1.0);
    }
}
