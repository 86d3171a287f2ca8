//! Compressor and limiter settings
//!
//! The host stores exactly one of two settings variants for a dynamic-range
//! effect. Both variants reduce to a common [`DynamicRangeProcessorSettings`]
//! base that the processing engine consumes. Resolution happens in one place
//! ([`From<&EffectSettings>`]) with an exhaustive match.

use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameter constraints for the dynamic-range effects
///
/// Values outside these ranges are rejected by configuration validation and
/// clamped by the `clamped()` helpers.
pub mod params {
    /// Threshold range in dBFS
    pub const THRESHOLD_MIN_DB: f32 = -60.0;
    pub const THRESHOLD_MAX_DB: f32 = 0.0;

    /// Make-up gain range for the compressor
    pub const MAKEUP_MIN_DB: f32 = 0.0;
    pub const MAKEUP_MAX_DB: f32 = 30.0;

    /// Make-up target range for the limiter
    pub const MAKEUP_TARGET_MIN_DB: f32 = -30.0;
    pub const MAKEUP_TARGET_MAX_DB: f32 = 0.0;

    /// Soft-knee width
    pub const KNEE_MIN_DB: f32 = 0.0;
    pub const KNEE_MAX_DB: f32 = 30.0;

    /// Compression ratio (1:1 to 100:1)
    pub const RATIO_MIN: f32 = 1.0;
    pub const RATIO_MAX: f32 = 100.0;

    /// Lookahead range. Engines preallocate for `LOOKAHEAD_MAX_MS`.
    pub const LOOKAHEAD_MIN_MS: f32 = 0.0;
    pub const LOOKAHEAD_MAX_MS: f32 = 1000.0;

    /// Attack/release ranges
    pub const ATTACK_MIN_MS: f32 = 0.0;
    pub const ATTACK_MAX_MS: f32 = 1000.0;
    pub const RELEASE_MIN_MS: f32 = 0.0;
    pub const RELEASE_MAX_MS: f32 = 1000.0;
}

/// Which curves the history visualizer should draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFlags {
    pub show_input: bool,
    pub show_output: bool,
    pub show_actual: bool,
    pub show_target: bool,
}

impl Default for DisplayFlags {
    fn default() -> Self {
        Self {
            show_input: false,
            show_output: true,
            show_actual: true,
            show_target: false,
        }
    }
}

/// User-facing compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub makeup_gain_db: f32,
    pub knee_width_db: f32,
    pub ratio: f32,
    pub lookahead_ms: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    #[serde(default)]
    pub display: DisplayFlags,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -10.0,
            makeup_gain_db: 0.0,
            knee_width_db: 5.0,
            ratio: 10.0,
            lookahead_ms: 1.0,
            attack_ms: 30.0,
            release_ms: 150.0,
            display: DisplayFlags::default(),
        }
    }
}

impl CompressorSettings {
    /// Copy of these settings with every parameter clamped to its range
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            threshold_db: self
                .threshold_db
                .clamp(params::THRESHOLD_MIN_DB, params::THRESHOLD_MAX_DB),
            makeup_gain_db: self
                .makeup_gain_db
                .clamp(params::MAKEUP_MIN_DB, params::MAKEUP_MAX_DB),
            knee_width_db: self
                .knee_width_db
                .clamp(params::KNEE_MIN_DB, params::KNEE_MAX_DB),
            ratio: self.ratio.clamp(params::RATIO_MIN, params::RATIO_MAX),
            lookahead_ms: self
                .lookahead_ms
                .clamp(params::LOOKAHEAD_MIN_MS, params::LOOKAHEAD_MAX_MS),
            attack_ms: self
                .attack_ms
                .clamp(params::ATTACK_MIN_MS, params::ATTACK_MAX_MS),
            release_ms: self
                .release_ms
                .clamp(params::RELEASE_MIN_MS, params::RELEASE_MAX_MS),
            display: self.display,
        }
    }
}

/// User-facing limiter parameters
///
/// A limiter is a compressor with an infinite ratio and instantaneous attack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    pub threshold_db: f32,
    pub makeup_target_db: f32,
    pub knee_width_db: f32,
    pub lookahead_ms: f32,
    pub release_ms: f32,
    #[serde(default)]
    pub display: DisplayFlags,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            threshold_db: -5.0,
            makeup_target_db: -1.0,
            knee_width_db: 2.0,
            lookahead_ms: 1.0,
            release_ms: 20.0,
            display: DisplayFlags::default(),
        }
    }
}

impl LimiterSettings {
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            threshold_db: self
                .threshold_db
                .clamp(params::THRESHOLD_MIN_DB, params::THRESHOLD_MAX_DB),
            makeup_target_db: self
                .makeup_target_db
                .clamp(params::MAKEUP_TARGET_MIN_DB, params::MAKEUP_TARGET_MAX_DB),
            knee_width_db: self
                .knee_width_db
                .clamp(params::KNEE_MIN_DB, params::KNEE_MAX_DB),
            lookahead_ms: self
                .lookahead_ms
                .clamp(params::LOOKAHEAD_MIN_MS, params::LOOKAHEAD_MAX_MS),
            release_ms: self
                .release_ms
                .clamp(params::RELEASE_MIN_MS, params::RELEASE_MAX_MS),
            display: self.display,
        }
    }
}

/// Settings container handed to the instance by the host
///
/// Exactly one variant is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EffectSettings {
    Compressor(CompressorSettings),
    Limiter(LimiterSettings),
}

impl EffectSettings {
    pub fn name(&self) -> &'static str {
        match self {
            EffectSettings::Compressor(_) => "Compressor",
            EffectSettings::Limiter(_) => "Limiter",
        }
    }

    pub fn as_compressor(&self) -> Option<&CompressorSettings> {
        match self {
            EffectSettings::Compressor(settings) => Some(settings),
            EffectSettings::Limiter(_) => None,
        }
    }

    pub fn as_limiter(&self) -> Option<&LimiterSettings> {
        match self {
            EffectSettings::Limiter(settings) => Some(settings),
            EffectSettings::Compressor(_) => None,
        }
    }

    /// Lookahead duration of whichever variant is active
    pub fn lookahead_ms(&self) -> f32 {
        DynamicRangeProcessorSettings::from(self).lookahead_ms
    }

    #[must_use]
    pub fn clamped(&self) -> Self {
        match self {
            EffectSettings::Compressor(settings) => EffectSettings::Compressor(settings.clamped()),
            EffectSettings::Limiter(settings) => EffectSettings::Limiter(settings.clamped()),
        }
    }
}

impl Default for EffectSettings {
    fn default() -> Self {
        EffectSettings::Compressor(CompressorSettings::default())
    }
}

impl From<CompressorSettings> for EffectSettings {
    fn from(settings: CompressorSettings) -> Self {
        EffectSettings::Compressor(settings)
    }
}

impl From<LimiterSettings> for EffectSettings {
    fn from(settings: LimiterSettings) -> Self {
        EffectSettings::Limiter(settings)
    }
}

/// Engine-facing settings shared by the compressor and the limiter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicRangeProcessorSettings {
    pub in_compression_thresh_db: f32,
    pub out_compression_thresh_db: f32,
    pub knee_width_db: f32,
    /// `f32::INFINITY` for the limiter
    pub compression_ratio: f32,
    pub lookahead_ms: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub display: DisplayFlags,
}

impl DynamicRangeProcessorSettings {
    /// Output level minus input level at the threshold
    #[inline]
    pub fn net_gain_db(&self) -> f32 {
        self.out_compression_thresh_db - self.in_compression_thresh_db
    }
}

impl Default for DynamicRangeProcessorSettings {
    fn default() -> Self {
        Self::from(CompressorSettings::default())
    }
}

impl From<CompressorSettings> for DynamicRangeProcessorSettings {
    fn from(settings: CompressorSettings) -> Self {
        Self {
            in_compression_thresh_db: settings.threshold_db,
            out_compression_thresh_db: settings.threshold_db + settings.makeup_gain_db,
            knee_width_db: settings.knee_width_db,
            compression_ratio: settings.ratio,
            lookahead_ms: settings.lookahead_ms,
            attack_ms: settings.attack_ms,
            release_ms: settings.release_ms,
            display: settings.display,
        }
    }
}

impl From<LimiterSettings> for DynamicRangeProcessorSettings {
    fn from(settings: LimiterSettings) -> Self {
        Self {
            in_compression_thresh_db: settings.threshold_db,
            out_compression_thresh_db: settings.makeup_target_db,
            knee_width_db: settings.knee_width_db,
            compression_ratio: f32::INFINITY,
            lookahead_ms: settings.lookahead_ms,
            attack_ms: 0.0,
            release_ms: settings.release_ms,
            display: settings.display,
        }
    }
}

impl From<&EffectSettings> for DynamicRangeProcessorSettings {
    fn from(settings: &EffectSettings) -> Self {
        match *settings {
            EffectSettings::Compressor(compressor) => compressor.into(),
            EffectSettings::Limiter(limiter) => limiter.into(),
        }
    }
}

/// Writer half of the settings hand-off from the UI thread to the audio thread
///
/// A store replaces whatever the reader has not picked up yet. Both halves
/// only touch a single-slot [`ArrayQueue`], so neither side ever waits on
/// the other and a block never sees a half-updated value.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    pending: Arc<ArrayQueue<EffectSettings>>,
}

/// Reader half, owned by the audio thread
#[derive(Debug)]
pub struct SettingsReader {
    pending: Arc<ArrayQueue<EffectSettings>>,
    current: EffectSettings,
}

impl SharedSettings {
    pub fn channel(initial: EffectSettings) -> (SharedSettings, SettingsReader) {
        let pending = Arc::new(ArrayQueue::new(1));
        let reader = SettingsReader {
            pending: Arc::clone(&pending),
            current: initial,
        };
        (Self { pending }, reader)
    }

    /// Publish new settings; returns a value the reader never picked up
    pub fn store(&self, settings: EffectSettings) -> Option<EffectSettings> {
        self.pending.force_push(settings)
    }
}

impl SettingsReader {
    /// Settings for the next block, taking the latest store if there is one
    pub fn load(&mut self) -> EffectSettings {
        if let Some(settings) = self.pending.pop() {
            self.current = settings;
        }
        self.current
    }

    /// Settings returned by the last [`load`](Self::load)
    pub fn current(&self) -> EffectSettings {
        self.current
    }
}
