//! Gain-computation engine interface
//!
//! The effect instance treats the engine as an opaque collaborator: it hands
//! over settings and sample blocks, and reads back per-frame statistics and
//! the static transfer curve for telemetry.

use crate::domain::settings::DynamicRangeProcessorSettings;

/// Statistics about the most recently processed block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Level of the loudest input sample of the block, in dBFS
    pub max_input_sample_db: f32,
    /// Gain reduction applied to that sample, in dB (zero or negative)
    pub db_attenuation_of_max_input_sample: f32,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            max_input_sample_db: f32::NEG_INFINITY,
            db_attenuation_of_max_input_sample: 0.0,
        }
    }
}

/// Block-based dynamic-range processor
///
/// # Real-time requirements
/// `apply_settings_if_needed`, `process`, `reinit` and the accessors are called
/// from the audio thread and must not allocate, lock or block. Only `init` may
/// allocate.
pub trait ProcessingEngine: Send {
    /// Adopt `settings` if they differ from the current ones
    ///
    /// Called once per block, so the unchanged case must be a cheap compare.
    fn apply_settings_if_needed(&mut self, settings: &DynamicRangeProcessorSettings);

    /// Size internal state for a stream configuration
    fn init(&mut self, sample_rate: f64, num_channels: usize, block_size: usize);

    /// Reset running state (envelopes, lookahead lines) keeping allocations
    fn reinit(&mut self);

    /// Process `block_len` frames from `inputs` into `outputs`
    ///
    /// Both slices hold one buffer per channel, each at least `block_len`
    /// samples long. Blocks longer than the configured block size are
    /// accepted.
    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], block_len: usize);

    fn last_frame_stats(&self) -> &FrameStats;

    fn settings(&self) -> &DynamicRangeProcessorSettings;

    /// Static input-level to output-level curve, in dB
    fn evaluate_transfer_function(&self, input_db: f32) -> f32;
}

/// Transfer curve of a soft-knee compressor
///
/// Below the knee the signal passes with the net make-up gain; above it the
/// level above threshold is divided by the ratio; inside the knee a quadratic
/// joins the two segments.
pub fn evaluate_transfer_function(settings: &DynamicRangeProcessorSettings, input_db: f32) -> f32 {
    let threshold = settings.in_compression_thresh_db;
    let knee = settings.knee_width_db;
    let slope = 1.0 / settings.compression_ratio - 1.0;
    let net_gain = settings.net_gain_db();

    if input_db <= threshold - knee / 2.0 {
        input_db + net_gain
    } else if input_db >= threshold + knee / 2.0 {
        input_db + slope * (input_db - threshold) + net_gain
    } else {
        let over = input_db - threshold + knee / 2.0;
        input_db + slope * over * over / (2.0 * knee) + net_gain
    }
}

/// Gain reduction at a full-scale input: how far the curve pulls 0 dBFS down
/// relative to the uncompressed path
pub fn max_compression_db(settings: &DynamicRangeProcessorSettings) -> f32 {
    settings.net_gain_db() - evaluate_transfer_function(settings, 0.0)
}
