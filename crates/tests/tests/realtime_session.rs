//! Integration tests for realtime sessions
//!
//! These exercise the whole chain a host and a visualizer share: instance
//! lifecycle, per-group slaves, telemetry publishing and the UI-side monitor.

use compand_core::domain::config::TelemetryConfig;
use compand_core::domain::{
    CompressionPacket, CompressionTelemetrySink, CompressorInstance, CompressorSettings,
    EffectSettings,
    InitializeProcessingSettings, LimiterSettings, PacketQueue, ProcessingSettingsBridge,
    SharedSettings,
};
use compand_infra::telemetry::{HistorySnapshot, TelemetryMonitor, TelemetryPublisher};
use compand_tests::{generate_silence, generate_sine_wave, scaled};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 512;

fn telemetry_config() -> TelemetryConfig {
    TelemetryConfig {
        queue_capacity: 256,
        max_subscribers: 2,
        refresh_interval_ms: 5,
        history_seconds: 10.0,
    }
}

fn process_blocks(
    instance: &mut CompressorInstance,
    group: usize,
    settings: &EffectSettings,
    signal: &[f32],
) -> usize {
    let mut left = generate_silence(BLOCK);
    let mut right = generate_silence(BLOCK);
    let mut total = 0;
    for chunk in signal.chunks_exact(BLOCK) {
        let inputs = [chunk, chunk];
        let mut outputs = [left.as_mut_slice(), right.as_mut_slice()];
        total += instance.realtime_process(group, settings, &inputs, &mut outputs, BLOCK);
    }
    total
}

async fn wait_for(
    rx: &mut watch::Receiver<HistorySnapshot>,
    f: impl FnMut(&HistorySnapshot) -> bool,
) -> HistorySnapshot {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f))
        .await
        .expect("monitor did not publish in time")
        .expect("monitor stopped")
        .clone()
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_bridge_sees_full_lifecycle() {
    let bridge = ProcessingSettingsBridge::new();
    let mut init_rx = bridge.subscribe_initialize();
    let mut resume_rx = bridge.subscribe_resume();
    let mut instance = CompressorInstance::new(bridge);

    instance.realtime_initialize(SAMPLE_RATE).unwrap();
    instance.realtime_resume();
    instance.realtime_finalize();

    assert_eq!(
        init_rx.try_recv().unwrap(),
        Some(InitializeProcessingSettings { sample_rate: SAMPLE_RATE })
    );
    assert!(resume_rx.try_recv().is_ok());
    assert_eq!(init_rx.try_recv().unwrap(), None);
}

#[test]
fn test_finalize_forgets_all_groups() {
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    let settings = EffectSettings::default();
    instance.realtime_initialize(SAMPLE_RATE).unwrap();
    for expected in 0..3 {
        let group = instance
            .realtime_add_processor(&settings, None, 2, SAMPLE_RATE)
            .unwrap();
        assert_eq!(group, expected);
    }

    instance.realtime_finalize();

    let signal = generate_silence(BLOCK);
    assert_eq!(process_blocks(&mut instance, 1, &settings, &signal), 0);
    assert_eq!(instance.slave_count(), 0);
}

#[test]
fn test_session_can_restart_after_finalize() {
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    let settings = EffectSettings::default();
    let signal = generate_sine_wave(440.0, SAMPLE_RATE as u32, 64.0);
    let signal = &signal[..BLOCK * 4];

    for _ in 0..2 {
        instance.realtime_initialize(SAMPLE_RATE).unwrap();
        instance
            .realtime_add_processor(&settings, None, 2, SAMPLE_RATE)
            .unwrap();
        assert_eq!(process_blocks(&mut instance, 0, &settings, signal), BLOCK * 4);
        assert_eq!(instance.slave(0).unwrap().sample_counter(), (BLOCK * 4) as i64);
        instance.realtime_finalize();
    }
}

// ============================================================================
// TELEMETRY
// ============================================================================

#[test]
fn test_packet_indices_follow_timeline() {
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    let settings = EffectSettings::default();
    let queue = Arc::new(PacketQueue::with_capacity(64));
    let sink: Arc<dyn CompressionTelemetrySink> = queue.clone();
    instance.realtime_initialize(SAMPLE_RATE).unwrap();
    instance
        .realtime_add_processor(&settings, Some(sink), 2, SAMPLE_RATE)
        .unwrap();

    let block = generate_silence(BLOCK);
    process_blocks(&mut instance, 0, &settings, &block);
    instance.realtime_pass_through(0, 300);
    process_blocks(&mut instance, 0, &settings, &block);

    let mut packets = Vec::new();
    queue.drain_into(&mut packets);
    let indices: Vec<i64> = packets.iter().map(|p| p.index_of_first_sample).collect();
    assert_eq!(indices, vec![0, (BLOCK + 300) as i64]);
}

#[test]
fn test_limiter_packets_report_compression() {
    let settings = EffectSettings::Limiter(LimiterSettings {
        threshold_db: -12.0,
        makeup_target_db: -12.0,
        knee_width_db: 0.0,
        lookahead_ms: 0.0,
        ..Default::default()
    });
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    let queue = Arc::new(PacketQueue::with_capacity(64));
    let sink: Arc<dyn CompressionTelemetrySink> = queue.clone();
    instance.realtime_initialize(SAMPLE_RATE).unwrap();
    instance
        .realtime_add_processor(&settings, Some(sink), 2, SAMPLE_RATE)
        .unwrap();

    let signal = generate_sine_wave(440.0, SAMPLE_RATE as u32, 64.0);
    process_blocks(&mut instance, 0, &settings, &signal[..BLOCK * 4]);

    let mut packets = Vec::new();
    queue.drain_into(&mut packets);
    assert_eq!(packets.len(), 4);
    for CompressionPacket {
        target_compression_db,
        actual_compression_db,
        ..
    } in packets
    {
        // Peaks near 0 dBFS are pulled down to -12 dBFS
        assert!((target_compression_db + 12.0).abs() < 0.1, "target {}", target_compression_db);
        assert!((actual_compression_db - target_compression_db).abs() < 0.1);
    }
}

#[test]
fn test_groups_process_in_parallel() {
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    let settings = EffectSettings::default();
    let publishers: Vec<_> = (0..4).map(|_| TelemetryPublisher::new(1, 64)).collect();
    let subscriptions: Vec<_> = publishers.iter().map(|p| p.subscribe().unwrap()).collect();

    instance.realtime_initialize(SAMPLE_RATE).unwrap();
    for publisher in &publishers {
        instance
            .realtime_add_processor(&settings, Some(publisher.sink()), 2, SAMPLE_RATE)
            .unwrap();
    }

    let signal = generate_sine_wave(440.0, SAMPLE_RATE as u32, 100.0);
    std::thread::scope(|scope| {
        for slave in instance.slaves_mut() {
            let signal = &signal;
            scope.spawn(move || {
                let mut left = generate_silence(BLOCK);
                let mut right = generate_silence(BLOCK);
                for chunk in signal.chunks_exact(BLOCK).take(8) {
                    let inputs = [chunk, chunk];
                    let mut outputs = [left.as_mut_slice(), right.as_mut_slice()];
                    slave.process(&settings, &inputs, &mut outputs, BLOCK);
                }
            });
        }
    });

    for (group, sub) in subscriptions.iter().enumerate() {
        let mut packets = Vec::new();
        assert_eq!(sub.drain_into(&mut packets), 8, "group {}", group);
        assert!(packets
            .windows(2)
            .all(|w| w[0].index_of_first_sample < w[1].index_of_first_sample));
        assert_eq!(instance.slave(group).unwrap().sample_counter(), (8 * BLOCK) as i64);
    }
}

#[test]
fn test_settings_swap_between_blocks() {
    let (shared, mut reader) = SharedSettings::channel(EffectSettings::default());
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    let queue = Arc::new(PacketQueue::with_capacity(8));
    let sink: Arc<dyn CompressionTelemetrySink> = queue.clone();
    instance.realtime_initialize(SAMPLE_RATE).unwrap();
    instance
        .realtime_add_processor(&reader.load(), Some(sink), 2, SAMPLE_RATE)
        .unwrap();

    // -20 dBFS sits below the default threshold
    let signal = scaled(&generate_sine_wave(440.0, SAMPLE_RATE as u32, 32.0), 0.1);
    process_blocks(&mut instance, 0, &reader.load(), &signal[..BLOCK]);

    shared.store(EffectSettings::Compressor(CompressorSettings {
        threshold_db: -40.0,
        ratio: 10.0,
        knee_width_db: 0.0,
        ..Default::default()
    }));
    process_blocks(&mut instance, 0, &reader.load(), &signal[BLOCK..2 * BLOCK]);

    let first = queue.pop().unwrap();
    let second = queue.pop().unwrap();
    assert!(first.target_compression_db.abs() < 1e-3);
    assert!(second.target_compression_db < -15.0);
}

// ============================================================================
// MONITOR
// ============================================================================

#[tokio::test]
async fn test_monitor_builds_history_from_session() {
    let config = telemetry_config();
    let bridge = ProcessingSettingsBridge::new();
    let publisher = TelemetryPublisher::from_config(&config);
    let monitor = TelemetryMonitor::spawn(&bridge, publisher.subscribe().unwrap(), &config);
    let mut rx = monitor.subscribe();

    let settings = EffectSettings::default();
    let mut instance = CompressorInstance::new(bridge);
    instance.realtime_initialize(SAMPLE_RATE).unwrap();
    instance
        .realtime_add_processor(&settings, Some(publisher.sink()), 2, SAMPLE_RATE)
        .unwrap();
    wait_for(&mut rx, |s| s.sample_rate == Some(SAMPLE_RATE)).await;

    let signal = generate_sine_wave(440.0, SAMPLE_RATE as u32, 200.0);
    let blocks = signal.len() / BLOCK;
    process_blocks(&mut instance, 0, &settings, &signal);
    let snapshot = wait_for(&mut rx, |s| s.point_count() == blocks).await;

    assert_eq!(snapshot.segments.len(), 1);
    let points = &snapshot.segments[0];
    assert_eq!(points[0].time, 0.0);
    assert!((points[1].time - (BLOCK as f64 / SAMPLE_RATE) as f32).abs() < 1e-6);
    // Full-scale sine against a -10 dB threshold
    assert!(snapshot.deepest_target_db().unwrap() < -5.0);

    instance.realtime_finalize();
    let snapshot = wait_for(&mut rx, |s| s.sample_rate.is_none()).await;
    assert!(snapshot.segments.is_empty());

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_monitor_splits_segments_on_resume() {
    let config = telemetry_config();
    let bridge = ProcessingSettingsBridge::new();
    let publisher = TelemetryPublisher::from_config(&config);
    let monitor = TelemetryMonitor::spawn(&bridge, publisher.subscribe().unwrap(), &config);
    let mut rx = monitor.subscribe();

    let settings = EffectSettings::default();
    let mut instance = CompressorInstance::new(bridge);
    instance.realtime_initialize(SAMPLE_RATE).unwrap();
    instance
        .realtime_add_processor(&settings, Some(publisher.sink()), 2, SAMPLE_RATE)
        .unwrap();
    wait_for(&mut rx, |s| s.sample_rate.is_some()).await;

    let signal = generate_sine_wave(440.0, SAMPLE_RATE as u32, 64.0);
    let signal = &signal[..BLOCK * 4];
    process_blocks(&mut instance, 0, &settings, signal);
    wait_for(&mut rx, |s| s.point_count() == 4).await;

    // Bypass a second, then resume
    instance.realtime_pass_through(0, SAMPLE_RATE as usize);
    instance.realtime_resume();
    wait_for(&mut rx, |s| s.resumes == 1).await;
    process_blocks(&mut instance, 0, &settings, signal);

    let snapshot = wait_for(&mut rx, |s| s.point_count() == 8).await;
    assert_eq!(snapshot.segments.len(), 2);
    let resumed_at = snapshot.segments[1][0].time;
    let expected = ((BLOCK * 4) as f64 / SAMPLE_RATE + 1.0) as f32;
    assert!((resumed_at - expected).abs() < 1e-4, "resumed at {}", resumed_at);

    let final_snapshot = monitor.shutdown().await;
    assert_eq!(final_snapshot.points_accepted, 8);
    instance.realtime_finalize();
}
