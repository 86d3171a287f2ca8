//! Example demonstrating configuration, presets and an offline render
//!
//! Run with: cargo run --package compand-core --example config_demo

use compand_core::domain::config::{CompandConfig, ConfigManager, PresetManager};
use compand_core::domain::{ChannelLayout, CompressorInstance, ProcessingSettingsBridge};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("compand_core=debug,info")
        .init();

    println!("=== Compand Configuration Demo ===\n");

    let workdir = tempfile::tempdir()?;

    // 1. Load (and create) the main configuration
    println!("1. Loading configuration...");
    let manager = ConfigManager::new(workdir.path().to_path_buf());
    let config: CompandConfig = manager.load().await;
    println!(
        "   ✓ {} with {} ms lookahead, written to {}",
        config.effect.name(),
        config.effect.lookahead_ms(),
        manager.config_path().display()
    );

    // 2. Presets
    println!("\n2. Preset management:");
    let presets = PresetManager::new(manager.preset_dir());
    let installed = presets.install_factory_presets().await?;
    println!("   ✓ Installed {} factory presets", installed);
    for name in presets.list_presets().await? {
        let effect = presets.load_preset(&name).await?;
        println!("   - {} ({})", name, effect.name());
    }

    // 3. Render one second of a loud sine through the brickwall preset
    println!("\n3. Offline render:");
    let effect = presets.load_preset("brickwall").await?;
    let sample_rate = 48000.0;
    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    instance.set_block_size(config.engine.offline_block_size);
    instance.process_initialize(&effect, sample_rate, ChannelLayout::Stereo)?;
    println!(
        "   Latency: {} samples",
        instance.latency_samples(&effect, sample_rate)
    );

    let block = instance.block_size();
    let input: Vec<f32> = (0..block).map(|i| (i as f32 * 0.05).sin()).collect();
    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];
    let mut peak = 0.0f32;
    for _ in 0..(sample_rate as usize / block) {
        let inputs = [input.as_slice(), input.as_slice()];
        let mut outputs = [left.as_mut_slice(), right.as_mut_slice()];
        instance.process_block(&effect, &inputs, &mut outputs, block);
        peak = left.iter().fold(peak, |acc, s| acc.max(s.abs()));
    }
    instance.process_finalize();
    println!(
        "   ✓ Processed {} samples, output peak {:.1} dB",
        instance.sample_counter(),
        20.0 * peak.log10()
    );

    println!("\n=== Demo Complete ===");
    Ok(())
}
