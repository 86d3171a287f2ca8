//! Domain entities and business rules

pub mod audio;
pub mod bridge;
pub mod compressor;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod history;
pub mod instance;
pub mod settings;
pub mod telemetry;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{ChannelLayout, InstanceError};
pub use bridge::{InitializeProcessingSettings, ProcessingSettingsBridge, RealtimeResumed};
pub use compressor::CompressorProcessor;
pub use config::{CompandConfig, ConfigError, ConfigManager, PresetManager};
pub use dsp::{fast_log2, max_db_increase};
pub use engine::{FrameStats, ProcessingEngine};
pub use history::{DynamicRangeProcessorHistory, HistoryPoint};
pub use instance::{CompressorInstance, RealtimeSlave};
pub use settings::{
    CompressorSettings, DynamicRangeProcessorSettings, EffectSettings, LimiterSettings,
    SettingsReader, SharedSettings,
};
pub use telemetry::{CompressionPacket, CompressionTelemetrySink, PacketQueue};
