//! Compand CLI Application

use anyhow::Context;
use clap::{Parser, Subcommand};
use compand_core::domain::audio::validate_sample_rate;
use compand_core::domain::config::{CompandConfig, ConfigManager, PresetManager};
use compand_core::domain::dsp::{gain_to_db, max_db_increase};
use compand_core::domain::{
    ChannelLayout, CompressorInstance, CompressorSettings, EffectSettings, LimiterSettings,
    ProcessingSettingsBridge,
};
use compand_infra::telemetry::{HistorySnapshot, TelemetryMonitor, TelemetryPublisher};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "compand")]
#[command(about = "Realtime compressor and limiter engine", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the latency a lookahead introduces
    Latency {
        #[arg(long, default_value_t = 1.0)]
        lookahead_ms: f32,

        #[arg(long, default_value_t = 44100.0)]
        sample_rate: f64,
    },

    /// Render a synthetic burst offline and report the gain change
    Render {
        /// Use the default limiter instead of the configured effect
        #[arg(long)]
        limiter: bool,

        /// Load the effect from a named preset
        #[arg(long, conflicts_with = "limiter")]
        preset: Option<String>,

        #[arg(long, default_value_t = 2.0)]
        seconds: f32,

        #[arg(long, default_value_t = 48000.0)]
        sample_rate: f64,

        /// Peak amplitude of the loud part of the burst
        #[arg(long, default_value_t = 1.0)]
        amplitude: f32,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a realtime session with telemetry and print the history summary
    Simulate {
        #[arg(long, default_value_t = 2)]
        groups: usize,

        #[arg(long, default_value_t = 300)]
        blocks: usize,

        #[arg(long, default_value_t = 48000.0)]
        sample_rate: f64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List effect presets, installing the factory set if missing
    Presets,
}

#[derive(Debug, Serialize)]
struct RenderReport {
    effect: &'static str,
    sample_rate: f64,
    samples: i64,
    latency_samples: u64,
    input_peak_db: f32,
    output_peak_db: f32,
    max_gain_increase_db: f32,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    effect: &'static str,
    groups: usize,
    samples_per_group: i64,
    packets_published: Vec<u64>,
    history_segments: usize,
    history_points: usize,
    deepest_target_db: Option<f32>,
}

struct AppContext {
    config: CompandConfig,
    preset_dir: Option<PathBuf>,
}

async fn load_context(path: Option<&PathBuf>) -> anyhow::Result<AppContext> {
    match path {
        Some(path) => {
            let config = CompandConfig::load_from_file(path)
                .await
                .with_context(|| format!("loading {}", path.display()))?;
            let preset_dir = path.parent().map(|dir| dir.join("presets"));
            Ok(AppContext { config, preset_dir })
        }
        None => match ConfigManager::default_config_dir() {
            Ok(dir) => {
                let manager = ConfigManager::new(dir);
                Ok(AppContext {
                    config: manager.load().await,
                    preset_dir: Some(manager.preset_dir()),
                })
            }
            Err(e) => {
                warn!(error = %e, "Using factory default configuration");
                Ok(AppContext {
                    config: CompandConfig::factory_default(),
                    preset_dir: None,
                })
            }
        },
    }
}

fn preset_manager(ctx: &AppContext) -> anyhow::Result<PresetManager> {
    let dir = ctx
        .preset_dir
        .clone()
        .context("no preset directory available")?;
    Ok(PresetManager::new(dir))
}

/// Quiet sine, loud burst, quiet sine
fn burst_signal(len: usize, sample_rate: f64, amplitude: f32) -> Vec<f32> {
    let step = (2.0 * std::f64::consts::PI * 440.0 / sample_rate) as f32;
    (0..len)
        .map(|i| {
            let level = if i >= len / 4 && i < len * 3 / 4 {
                amplitude
            } else {
                amplitude * 0.05
            };
            level * (i as f32 * step).sin()
        })
        .collect()
}

fn peak_db(samples: &[f32]) -> f32 {
    gain_to_db(samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs())))
}

fn render(
    config: &CompandConfig,
    effect: EffectSettings,
    seconds: f32,
    sample_rate: f64,
    amplitude: f32,
) -> anyhow::Result<RenderReport> {
    let sample_rate = validate_sample_rate(sample_rate)?;
    let len = (f64::from(seconds.max(0.0)) * sample_rate) as usize;
    let input = burst_signal(len, sample_rate, amplitude);
    let mut left = vec![0.0f32; len];
    let mut right = vec![0.0f32; len];

    let mut instance = CompressorInstance::new(ProcessingSettingsBridge::new());
    instance.set_block_size(config.engine.offline_block_size);
    instance.process_initialize(&effect, sample_rate, ChannelLayout::Stereo)?;

    let block = instance.block_size();
    let mut start = 0;
    while start < len {
        let end = (start + block).min(len);
        let inputs = [&input[start..end], &input[start..end]];
        let mut outputs = [&mut left[start..end], &mut right[start..end]];
        instance.process_block(&effect, &inputs, &mut outputs, end - start);
        start = end;
    }
    instance.process_finalize();

    let report = RenderReport {
        effect: effect.name(),
        sample_rate,
        samples: instance.sample_counter(),
        latency_samples: instance.latency_samples(&effect, sample_rate),
        input_peak_db: peak_db(&input),
        output_peak_db: peak_db(&left).max(peak_db(&right)),
        max_gain_increase_db: max_db_increase(&input, &left).max(max_db_increase(&input, &right)),
    };
    debug!(?report, "Render finished");
    Ok(report)
}

async fn simulate(
    config: &CompandConfig,
    groups: usize,
    blocks: usize,
    sample_rate: f64,
) -> anyhow::Result<SimulationReport> {
    let sample_rate = validate_sample_rate(sample_rate)?;
    let groups = groups.max(1);
    let effect = config.effect;
    let bridge = ProcessingSettingsBridge::new();
    let publishers: Vec<_> = (0..groups)
        .map(|_| TelemetryPublisher::from_config(&config.telemetry))
        .collect();

    let monitor = TelemetryMonitor::spawn(&bridge, publishers[0].subscribe()?, &config.telemetry);
    let mut snapshots = monitor.subscribe();

    let mut instance = CompressorInstance::new(bridge);
    instance.realtime_initialize(sample_rate)?;
    for publisher in &publishers {
        instance.realtime_add_processor(&effect, Some(publisher.sink()), 2, sample_rate)?;
    }

    // The monitor discards packets that arrive before it sees the session start
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| s.sample_rate.is_some()),
    )
    .await
    .context("telemetry monitor did not start")??;

    let block_size = instance.block_size();
    let pace = Duration::from_millis(config.telemetry.refresh_interval_ms / 4);
    let instance = tokio::task::spawn_blocking(move || {
        let input = burst_signal(block_size * blocks, sample_rate, 1.0);
        let mut left = vec![0.0f32; block_size];
        let mut right = vec![0.0f32; block_size];
        let (bypass_start, bypass_end) = (blocks / 3, blocks / 2);

        for b in 0..blocks {
            if b == bypass_end {
                instance.realtime_resume();
            }
            for group in 0..instance.slave_count() {
                if (bypass_start..bypass_end).contains(&b) {
                    instance.realtime_pass_through(group, block_size);
                    continue;
                }
                let chunk = &input[b * block_size..(b + 1) * block_size];
                let inputs = [chunk, chunk];
                let mut outputs = [left.as_mut_slice(), right.as_mut_slice()];
                instance.realtime_process(group, &effect, &inputs, &mut outputs, block_size);
            }
            // Let the monitor keep up without growing the queues
            if b % 16 == 15 {
                std::thread::sleep(pace);
            }
        }
        instance
    })
    .await?;

    let samples_per_group = instance.slave(0).map(|s| s.sample_counter()).unwrap_or(0);
    let snapshot: HistorySnapshot = monitor.shutdown().await;
    let mut instance = instance;
    instance.realtime_finalize();

    Ok(SimulationReport {
        effect: effect.name(),
        groups,
        samples_per_group,
        packets_published: publishers.iter().map(TelemetryPublisher::published_count).collect(),
        history_segments: snapshot.segments.len(),
        history_points: snapshot.point_count(),
        deepest_target_db: snapshot.deepest_target_db(),
    })
}

fn print_report<T: Serialize + std::fmt::Debug>(report: &T, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{:#?}", report);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Compand starting...");

    let ctx = load_context(cli.config.as_ref()).await?;

    match cli.command {
        Command::Latency {
            lookahead_ms,
            sample_rate,
        } => {
            let sample_rate = validate_sample_rate(sample_rate)?;
            let effect = EffectSettings::Compressor(CompressorSettings {
                lookahead_ms,
                ..Default::default()
            });
            let instance = CompressorInstance::new(ProcessingSettingsBridge::new());
            println!("{}", instance.latency_samples(&effect, sample_rate));
        }
        Command::Render {
            limiter,
            preset,
            seconds,
            sample_rate,
            amplitude,
            json,
        } => {
            let effect = match preset {
                Some(name) => preset_manager(&ctx)?.load_preset(&name).await?,
                None if limiter => LimiterSettings::default().into(),
                None => ctx.config.effect,
            };
            let report = render(&ctx.config, effect, seconds, sample_rate, amplitude)?;
            print_report(&report, json)?;
        }
        Command::Simulate {
            groups,
            blocks,
            sample_rate,
            json,
        } => {
            let report = simulate(&ctx.config, groups, blocks, sample_rate).await?;
            print_report(&report, json)?;
        }
        Command::Presets => {
            let presets = preset_manager(&ctx)?;
            let installed = presets.install_factory_presets().await?;
            if installed > 0 {
                info!(installed, "Installed factory presets");
            }
            for name in presets.list_presets().await? {
                let effect = presets.load_preset(&name).await?;
                println!("{:<24} {}", name, effect.name());
            }
        }
    }

    Ok(())
}
