//! Integration tests for the offline render path
//!
//! These drive a [`CompressorInstance`] the way a host renders a selection:
//! initialize, feed fixed-size blocks, finalize.

use compand_core::domain::dsp::{db_to_gain, max_db_increase};
use compand_core::domain::{
    ChannelLayout, CompressorInstance, CompressorSettings, EffectSettings, InstanceError,
    LimiterSettings, ProcessingSettingsBridge,
};
use compand_tests::{generate_silence, generate_sine_wave, peak, scaled};
use proptest::prelude::*;

const SAMPLE_RATE: u32 = 48000;

fn render(instance: &mut CompressorInstance, settings: &EffectSettings, input: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mut left = generate_silence(input.len());
    let mut right = generate_silence(input.len());
    let block = instance.block_size();

    let mut start = 0;
    while start < input.len() {
        let end = (start + block).min(input.len());
        let inputs = [&input[start..end], &input[start..end]];
        let mut outputs = [&mut left[start..end], &mut right[start..end]];
        let processed = instance.process_block(settings, &inputs, &mut outputs, end - start);
        assert_eq!(processed, end - start);
        start = end;
    }
    (left, right)
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_offline_rejects_non_stereo() {
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    let settings = EffectSettings::default();

    let err = instance
        .process_initialize(&settings, SAMPLE_RATE as f64, ChannelLayout::Mono)
        .unwrap_err();
    assert_eq!(err, InstanceError::UnsupportedChannelLayout(ChannelLayout::Mono));
    assert_eq!(instance.sample_rate(), None);
}

#[test]
fn test_offline_counts_every_sample() {
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    instance.set_block_size(100);
    let settings = EffectSettings::default();
    let input = generate_sine_wave(440.0, SAMPLE_RATE, 25.0);

    instance
        .process_initialize(&settings, SAMPLE_RATE as f64, ChannelLayout::Stereo)
        .unwrap();
    render(&mut instance, &settings, &input);
    instance.process_finalize();

    assert_eq!(instance.sample_counter(), input.len() as i64);
    assert_eq!(instance.sample_rate(), None);
}

#[test]
fn test_offline_does_not_publish_on_bridge() {
    let bridge = ProcessingSettingsBridge::new();
    let mut rx = bridge.subscribe_initialize();
    let mut instance = CompressorInstance::new(bridge);
    let settings = EffectSettings::default();

    instance
        .process_initialize(&settings, SAMPLE_RATE as f64, ChannelLayout::Stereo)
        .unwrap();
    instance.process_finalize();

    assert!(rx.try_recv().is_err());
}

// ============================================================================
// PROCESSING
// ============================================================================

#[test]
fn test_limiter_holds_ceiling() {
    let settings = EffectSettings::Limiter(LimiterSettings {
        threshold_db: -10.0,
        makeup_target_db: -3.0,
        knee_width_db: 0.0,
        lookahead_ms: 0.0,
        release_ms: 20.0,
        ..Default::default()
    });
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    instance
        .process_initialize(&settings, SAMPLE_RATE as f64, ChannelLayout::Stereo)
        .unwrap();

    let input = generate_sine_wave(440.0, SAMPLE_RATE, 200.0);
    let (left, right) = render(&mut instance, &settings, &input);

    let ceiling = db_to_gain(-3.0) + 1e-4;
    assert!(peak(&left) <= ceiling, "left peak {} above ceiling", peak(&left));
    assert!(peak(&right) <= ceiling);
}

#[test]
fn test_quiet_signal_gets_makeup_gain() {
    let settings = EffectSettings::Compressor(CompressorSettings {
        threshold_db: -10.0,
        makeup_gain_db: 6.0,
        knee_width_db: 0.0,
        lookahead_ms: 0.0,
        ..Default::default()
    });
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    instance
        .process_initialize(&settings, SAMPLE_RATE as f64, ChannelLayout::Stereo)
        .unwrap();

    // -40 dBFS is far below the threshold, so only makeup applies
    let input = scaled(&generate_sine_wave(440.0, SAMPLE_RATE, 50.0), 0.01);
    let (left, _) = render(&mut instance, &settings, &input);

    let increase = max_db_increase(&input, &left);
    assert!((increase - 6.0).abs() < 0.05, "increase was {}", increase);
}

#[test]
fn test_loud_signal_is_compressed() {
    let settings = EffectSettings::Compressor(CompressorSettings {
        threshold_db: -20.0,
        ratio: 4.0,
        knee_width_db: 0.0,
        attack_ms: 0.0,
        lookahead_ms: 0.0,
        ..Default::default()
    });
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    instance
        .process_initialize(&settings, SAMPLE_RATE as f64, ChannelLayout::Stereo)
        .unwrap();

    let input = generate_sine_wave(440.0, SAMPLE_RATE, 100.0);
    let (left, _) = render(&mut instance, &settings, &input);

    // 0 dBFS peak lands at -20 + 20/4 = -15 dBFS
    let expected = db_to_gain(-15.0);
    assert!((peak(&left) - expected).abs() < 0.01, "peak {}", peak(&left));
}

#[test]
fn test_silence_reports_no_gain_increase() {
    let input = generate_silence(512);
    let output = generate_silence(512);

    assert_eq!(max_db_increase(&input, &output), f32::NEG_INFINITY);
}

proptest! {
    #[test]
    fn latency_matches_lookahead(lookahead_ms in 0.0f32..1000.0, rate in prop::sample::select(vec![22050.0, 44100.0, 48000.0, 96000.0])) {
        let instance = CompressorInstance::new(ProcessingSettingsBridge::new());
        let settings = EffectSettings::Compressor(CompressorSettings {
            lookahead_ms,
            ..Default::default()
        });

        let latency = instance.latency_samples(&settings, rate);
        let exact = f64::from(lookahead_ms) * rate / 1000.0;
        prop_assert!(latency as f64 <= exact);
        prop_assert!(exact - (latency as f64) < 1.0);
    }
}
