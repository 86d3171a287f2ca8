//! Effect instance: lifecycle and block dispatch for the dynamic-range engine
//!
//! A [`CompressorInstance`] serves two host protocols:
//!
//! - **Offline rendering**: `process_initialize` / `process_block` /
//!   `process_finalize`, using the instance's own engine.
//! - **Realtime playback**: `realtime_initialize` / `realtime_add_processor` /
//!   `realtime_process` / `realtime_pass_through` / `realtime_resume` /
//!   `realtime_finalize`, using one [`RealtimeSlave`] per channel group.
//!
//! Block-level entry points never allocate, lock or block. Lifecycle
//! transitions are reported on the session's [`ProcessingSettingsBridge`].

use crate::domain::audio::{validate_sample_rate, ChannelLayout, InstanceError, Result};
use crate::domain::bridge::{InitializeProcessingSettings, ProcessingSettingsBridge};
use crate::domain::compressor::CompressorProcessor;
use crate::domain::engine::ProcessingEngine;
use crate::domain::settings::{DynamicRangeProcessorSettings, EffectSettings};
use crate::domain::telemetry::{CompressionPacket, CompressionTelemetrySink};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Block size used for realtime processing
pub const REALTIME_BLOCK_SIZE: usize = 512;

/// Block size used for offline processing unless the host sets another
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Audio inputs and outputs of the effect (stereo only)
pub const AUDIO_CHANNELS: usize = 2;

/// Resolve settings and run one block through an engine
///
/// The engine always consumes the full block.
#[inline]
fn process_with<E: ProcessingEngine>(
    engine: &mut E,
    settings: &EffectSettings,
    inputs: &[&[f32]],
    outputs: &mut [&mut [f32]],
    block_len: usize,
) -> usize {
    engine.apply_settings_if_needed(&DynamicRangeProcessorSettings::from(settings));
    engine.process(inputs, outputs, block_len);
    block_len
}

/// Build the telemetry packet for the block an engine just processed
pub fn compression_packet<E: ProcessingEngine>(engine: &E, index_of_first_sample: i64) -> CompressionPacket {
    let stats = engine.last_frame_stats();
    let net_gain = engine.settings().net_gain_db();
    let target_compression_db = engine.evaluate_transfer_function(stats.max_input_sample_db)
        - stats.max_input_sample_db
        - net_gain;

    CompressionPacket {
        index_of_first_sample,
        target_compression_db,
        actual_compression_db: stats.db_attenuation_of_max_input_sample,
    }
}

/// Processing pipeline for one realtime channel group
///
/// Slaves share nothing with each other, so a host may process different
/// groups on different threads via [`CompressorInstance::slaves_mut`].
pub struct RealtimeSlave<E = CompressorProcessor> {
    engine: E,
    sink: Option<Arc<dyn CompressionTelemetrySink>>,
    sample_counter: i64,
}

impl<E: ProcessingEngine> RealtimeSlave<E> {
    fn new(engine: E, sink: Option<Arc<dyn CompressionTelemetrySink>>) -> Self {
        Self {
            engine,
            sink,
            sample_counter: 0,
        }
    }

    /// Process one block; pushes a packet when a sink is attached and the
    /// block is not empty
    pub fn process(
        &mut self,
        settings: &EffectSettings,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        num_samples: usize,
    ) -> usize {
        let processed = process_with(&mut self.engine, settings, inputs, outputs, num_samples);

        if processed > 0 {
            if let Some(sink) = &self.sink {
                sink.push(compression_packet(&self.engine, self.sample_counter));
            }
        }

        self.sample_counter += processed as i64;
        processed
    }

    /// Account for samples the host routed around this slave
    pub fn pass_through(&mut self, num_samples: usize) {
        self.sample_counter += num_samples as i64;
    }

    /// Samples processed or bypassed since the slave was created
    pub fn sample_counter(&self) -> i64 {
        self.sample_counter
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }
}

impl<E> std::fmt::Debug for RealtimeSlave<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSlave")
            .field("has_sink", &self.sink.is_some())
            .field("sample_counter", &self.sample_counter)
            .finish()
    }
}

/// Compressor/limiter effect instance
pub struct CompressorInstance<E = CompressorProcessor> {
    engine: E,
    slaves: Vec<RealtimeSlave<E>>,
    sample_rate: Option<f64>,
    block_size: usize,
    sample_counter: i64,
    bridge: ProcessingSettingsBridge,
}

impl CompressorInstance<CompressorProcessor> {
    /// Instance using the reference engine
    pub fn new(bridge: ProcessingSettingsBridge) -> Self {
        Self::with_engine(bridge)
    }
}

impl<E: ProcessingEngine + Default> CompressorInstance<E> {
    pub fn with_engine(bridge: ProcessingSettingsBridge) -> Self {
        Self {
            engine: E::default(),
            slaves: Vec::new(),
            sample_rate: None,
            block_size: DEFAULT_BLOCK_SIZE,
            sample_counter: 0,
            bridge,
        }
    }

    /// Sample rate of the active processing pass, if any
    pub fn sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Block size for subsequent engine initializations
    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size.max(1);
    }

    pub fn audio_in_count(&self) -> usize {
        AUDIO_CHANNELS
    }

    pub fn audio_out_count(&self) -> usize {
        AUDIO_CHANNELS
    }

    /// Samples rendered by the offline path since the last initialization
    pub fn sample_counter(&self) -> i64 {
        self.sample_counter
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn bridge(&self) -> &ProcessingSettingsBridge {
        &self.bridge
    }

    /// Output delay, in samples, caused by the lookahead
    ///
    /// Fractional samples are truncated.
    pub fn latency_samples(&self, settings: &EffectSettings, sample_rate: f64) -> u64 {
        (f64::from(settings.lookahead_ms()) * sample_rate / 1000.0) as u64
    }

    // ------------------------------------------------------------------------
    // Offline path
    // ------------------------------------------------------------------------

    pub fn process_initialize(
        &mut self,
        settings: &EffectSettings,
        sample_rate: f64,
        layout: ChannelLayout,
    ) -> Result<()> {
        if layout.count() != AUDIO_CHANNELS {
            warn!(?layout, "Rejecting non-stereo channel layout");
            return Err(InstanceError::UnsupportedChannelLayout(layout));
        }
        let sample_rate = validate_sample_rate(sample_rate)?;

        self.sample_rate = Some(sample_rate);
        self.sample_counter = 0;
        self.engine
            .apply_settings_if_needed(&DynamicRangeProcessorSettings::from(settings));
        self.engine.init(sample_rate, AUDIO_CHANNELS, self.block_size);

        info!(
            effect = settings.name(),
            sample_rate,
            block_size = self.block_size,
            "Offline processing initialized"
        );
        Ok(())
    }

    pub fn process_block(
        &mut self,
        settings: &EffectSettings,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        block_len: usize,
    ) -> usize {
        let processed = process_with(&mut self.engine, settings, inputs, outputs, block_len);
        self.sample_counter += processed as i64;
        processed
    }

    pub fn process_finalize(&mut self) {
        self.sample_rate = None;
        info!("Offline processing finalized");
    }

    // ------------------------------------------------------------------------
    // Realtime path
    // ------------------------------------------------------------------------

    pub fn realtime_initialize(&mut self, sample_rate: f64) -> Result<()> {
        let sample_rate = validate_sample_rate(sample_rate)?;

        self.block_size = REALTIME_BLOCK_SIZE;
        self.slaves.clear();
        self.sample_counter = 0;
        self.sample_rate = Some(sample_rate);
        self.bridge
            .publish_initialize(Some(InitializeProcessingSettings { sample_rate }));

        info!(sample_rate, block_size = self.block_size, "Realtime processing initialized");
        Ok(())
    }

    /// Add a processor for a new channel group; returns its group index
    pub fn realtime_add_processor(
        &mut self,
        settings: &EffectSettings,
        sink: Option<Arc<dyn CompressionTelemetrySink>>,
        num_channels: usize,
        sample_rate: f64,
    ) -> Result<usize> {
        if num_channels == 0 {
            return Err(InstanceError::InvalidChannelCount(num_channels));
        }
        let sample_rate = validate_sample_rate(sample_rate)?;

        let mut engine = E::default();
        engine.apply_settings_if_needed(&DynamicRangeProcessorSettings::from(settings));
        engine.init(sample_rate, num_channels, self.block_size);

        let group = self.slaves.len();
        self.slaves.push(RealtimeSlave::new(engine, sink));

        debug!(
            group,
            num_channels,
            sample_rate,
            telemetry = self.slaves[group].has_sink(),
            "Realtime processor added"
        );
        Ok(group)
    }

    /// Process a block for `group`; unknown groups process nothing
    pub fn realtime_process(
        &mut self,
        group: usize,
        settings: &EffectSettings,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        num_samples: usize,
    ) -> usize {
        match self.slaves.get_mut(group) {
            Some(slave) => slave.process(settings, inputs, outputs, num_samples),
            None => 0,
        }
    }

    /// Keep `group`'s timeline moving while the host bypasses it
    pub fn realtime_pass_through(&mut self, group: usize, num_samples: usize) {
        if let Some(slave) = self.slaves.get_mut(group) {
            slave.pass_through(num_samples);
        }
    }

    pub fn realtime_resume(&mut self) {
        // Rate, channels and block size are unchanged, so this only resets state
        for slave in &mut self.slaves {
            slave.engine.reinit();
        }
        self.bridge.publish_resume();

        debug!(slaves = self.slaves.len(), "Realtime processing resumed");
    }

    pub fn realtime_finalize(&mut self) {
        self.slaves.clear();
        self.sample_rate = None;
        self.bridge.publish_initialize(None);

        info!("Realtime processing finalized");
    }

    pub fn slave_count(&self) -> usize {
        self.slaves.len()
    }

    pub fn slave(&self, group: usize) -> Option<&RealtimeSlave<E>> {
        self.slaves.get(group)
    }

    /// Slaves indexed by group, for hosts that process groups in parallel
    pub fn slaves_mut(&mut self) -> &mut [RealtimeSlave<E>] {
        &mut self.slaves
    }
}
