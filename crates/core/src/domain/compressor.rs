//! Reference dynamic-range engine
//!
//! Stereo-linked feed-forward compressor/limiter with soft knee, one-pole
//! attack/release smoothing of the gain reduction, and a lookahead delay on
//! the audio path.
//!
//! All buffers are sized in [`ProcessingEngine::init`] for the largest
//! lookahead the parameters allow, so settings changes and
//! [`ProcessingEngine::reinit`] never allocate.

use crate::domain::dsp::{db_to_gain, gain_to_db, time_constant_coeff};
use crate::domain::engine::{evaluate_transfer_function, FrameStats, ProcessingEngine};
use crate::domain::settings::{params, DynamicRangeProcessorSettings};
use tracing::debug;

/// Compressor/limiter engine driven by [`DynamicRangeProcessorSettings`]
#[derive(Debug, Clone)]
pub struct CompressorProcessor {
    settings: DynamicRangeProcessorSettings,
    sample_rate: f32,
    num_channels: usize,
    block_size: usize,
    // Coefficients (pre-computed for performance)
    attack_coeff: f32,
    release_coeff: f32,
    lookahead_samples: usize,
    // One ring per channel, length is a power of two
    delay_lines: Vec<Vec<f32>>,
    mask: usize,
    write_pos: usize,
    // Smoothed gain reduction in dB (<= 0)
    envelope_db: f32,
    stats: FrameStats,
}

impl Default for CompressorProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressorProcessor {
    /// Create an engine with default compressor settings
    ///
    /// The engine passes audio through unchanged until [`ProcessingEngine::init`]
    /// has been called.
    pub fn new() -> Self {
        Self {
            settings: DynamicRangeProcessorSettings::default(),
            sample_rate: 0.0,
            num_channels: 0,
            block_size: 0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            lookahead_samples: 0,
            delay_lines: Vec::new(),
            mask: 0,
            write_pos: 0,
            envelope_db: 0.0,
            stats: FrameStats::default(),
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Current lookahead delay in samples
    pub fn lookahead_samples(&self) -> usize {
        self.lookahead_samples
    }

    /// Allocated delay-line length per channel
    pub fn delay_capacity(&self) -> usize {
        self.delay_lines.first().map_or(0, Vec::len)
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = time_constant_coeff(self.settings.attack_ms, self.sample_rate);
        self.release_coeff = time_constant_coeff(self.settings.release_ms, self.sample_rate);

        let wanted = (self.settings.lookahead_ms.max(0.0) * self.sample_rate / 1000.0) as usize;
        // Bounded by the allocation made in init()
        self.lookahead_samples = wanted.min(self.mask);
    }

    /// Gain reduction the static curve asks for at `input_db`
    #[inline]
    fn target_gain_reduction_db(&self, input_db: f32) -> f32 {
        let reduction = evaluate_transfer_function(&self.settings, input_db)
            - input_db
            - self.settings.net_gain_db();
        reduction.min(0.0)
    }

    /// Update the gain-reduction envelope (attack when reducing more)
    #[inline]
    fn update_envelope(&mut self, target_db: f32) -> f32 {
        let coeff = if target_db < self.envelope_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };

        self.envelope_db = coeff * self.envelope_db + (1.0 - coeff) * target_db;
        self.envelope_db
    }
}

impl ProcessingEngine for CompressorProcessor {
    fn apply_settings_if_needed(&mut self, settings: &DynamicRangeProcessorSettings) {
        if self.settings == *settings {
            return;
        }

        self.settings = *settings;
        self.update_coefficients();
    }

    fn init(&mut self, sample_rate: f64, num_channels: usize, block_size: usize) {
        self.sample_rate = sample_rate as f32;
        self.num_channels = num_channels;
        self.block_size = block_size;

        let max_lookahead = (params::LOOKAHEAD_MAX_MS * self.sample_rate / 1000.0).ceil() as usize;
        let capacity = (max_lookahead + 1).next_power_of_two();
        self.delay_lines = vec![vec![0.0; capacity]; num_channels];
        self.mask = capacity - 1;

        self.update_coefficients();
        self.reinit();

        debug!(
            sample_rate,
            num_channels,
            block_size,
            lookahead_samples = self.lookahead_samples,
            "Compressor engine initialized"
        );
    }

    fn reinit(&mut self) {
        for line in &mut self.delay_lines {
            line.fill(0.0);
        }
        self.write_pos = 0;
        self.envelope_db = 0.0;
        self.stats = FrameStats::default();
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], block_len: usize) {
        let channels = self
            .delay_lines
            .len()
            .min(inputs.len())
            .min(outputs.len());
        let make_up = self.settings.net_gain_db();

        let mut max_level = 0.0_f32;
        let mut attenuation_at_max = 0.0_f32;

        for i in 0..block_len {
            // Stereo-linked detection on the undelayed signal
            let mut level = 0.0_f32;
            for input in inputs.iter().take(channels) {
                level = level.max(input[i].abs());
            }

            let target = self.target_gain_reduction_db(gain_to_db(level));
            let reduction = self.update_envelope(target);
            if level > max_level {
                max_level = level;
                attenuation_at_max = reduction;
            }

            let gain = db_to_gain(reduction + make_up);
            let read_pos = (self.write_pos + self.mask + 1 - self.lookahead_samples) & self.mask;
            for ch in 0..channels {
                let line = &mut self.delay_lines[ch];
                line[self.write_pos] = inputs[ch][i];
                outputs[ch][i] = line[read_pos] * gain;
            }
            self.write_pos = (self.write_pos + 1) & self.mask;
        }

        // Channels the engine was not configured for pass through
        for (input, output) in inputs.iter().zip(outputs.iter_mut()).skip(channels) {
            output[..block_len].copy_from_slice(&input[..block_len]);
        }

        self.stats = FrameStats {
            max_input_sample_db: gain_to_db(max_level),
            db_attenuation_of_max_input_sample: attenuation_at_max,
        };
    }

    fn last_frame_stats(&self) -> &FrameStats {
        &self.stats
    }

    fn settings(&self) -> &DynamicRangeProcessorSettings {
        &self.settings
    }

    fn evaluate_transfer_function(&self, input_db: f32) -> f32 {
        evaluate_transfer_function(&self.settings, input_db)
    }
}
