//! Configuration management for Compand
//!
//! This module provides:
//! - Configuration structs for the engine, telemetry and default effect settings
//! - Effect preset system with TOML serialization
//! - A config manager with factory defaults and corrupt-file recovery

use crate::domain::instance::DEFAULT_BLOCK_SIZE;
use crate::domain::settings::{params, CompressorSettings, EffectSettings, LimiterSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Offline engine settings
///
/// Realtime sessions always run at the fixed realtime block size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Frames per offline render block
    pub offline_block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            offline_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Telemetry delivery to visualizers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Packets buffered per subscriber before the oldest are dropped
    pub queue_capacity: usize,

    /// Concurrent telemetry subscribers
    pub max_subscribers: usize,

    /// How often the visualizer drains packets, in milliseconds
    pub refresh_interval_ms: u64,

    /// Seconds of history kept for display
    pub history_seconds: f32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_subscribers: 4,
            refresh_interval_ms: 30,
            history_seconds: 10.0,
        }
    }
}

/// Complete Compand configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompandConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Settings a new effect instance starts with
    #[serde(default)]
    pub effect: EffectSettings,
}

impl CompandConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine.offline_block_size == 0 {
            return Err(ConfigError::Invalid("offline block size must be non-zero".to_string()));
        }
        if self.telemetry.queue_capacity == 0 {
            return Err(ConfigError::Invalid("telemetry queue capacity must be non-zero".to_string()));
        }
        if self.telemetry.max_subscribers == 0 {
            return Err(ConfigError::Invalid("at least one telemetry subscriber is required".to_string()));
        }
        if !(self.telemetry.history_seconds > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "history length must be positive, got {}",
                self.telemetry.history_seconds
            )));
        }
        validate_effect(&self.effect)
    }

    /// Create factory default configuration
    pub fn factory_default() -> Self {
        Self::default()
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} = {} is outside [{}, {}]",
            name, value, min, max
        )))
    }
}

/// Check every parameter of an effect against [`params`]
pub fn validate_effect(settings: &EffectSettings) -> Result<()> {
    match settings {
        EffectSettings::Compressor(s) => {
            check_range("threshold_db", s.threshold_db, params::THRESHOLD_MIN_DB, params::THRESHOLD_MAX_DB)?;
            check_range("makeup_gain_db", s.makeup_gain_db, params::MAKEUP_MIN_DB, params::MAKEUP_MAX_DB)?;
            check_range("knee_width_db", s.knee_width_db, params::KNEE_MIN_DB, params::KNEE_MAX_DB)?;
            check_range("ratio", s.ratio, params::RATIO_MIN, params::RATIO_MAX)?;
            check_range("lookahead_ms", s.lookahead_ms, params::LOOKAHEAD_MIN_MS, params::LOOKAHEAD_MAX_MS)?;
            check_range("attack_ms", s.attack_ms, params::ATTACK_MIN_MS, params::ATTACK_MAX_MS)?;
            check_range("release_ms", s.release_ms, params::RELEASE_MIN_MS, params::RELEASE_MAX_MS)
        }
        EffectSettings::Limiter(s) => {
            check_range("threshold_db", s.threshold_db, params::THRESHOLD_MIN_DB, params::THRESHOLD_MAX_DB)?;
            check_range(
                "makeup_target_db",
                s.makeup_target_db,
                params::MAKEUP_TARGET_MIN_DB,
                params::MAKEUP_TARGET_MAX_DB,
            )?;
            check_range("knee_width_db", s.knee_width_db, params::KNEE_MIN_DB, params::KNEE_MAX_DB)?;
            check_range("lookahead_ms", s.lookahead_ms, params::LOOKAHEAD_MIN_MS, params::LOOKAHEAD_MAX_MS)?;
            check_range("release_ms", s.release_ms, params::RELEASE_MIN_MS, params::RELEASE_MAX_MS)
        }
    }
}

/// Built-in presets shipped with the effect
pub fn factory_presets() -> Vec<(&'static str, EffectSettings)> {
    vec![
        ("default-compressor", CompressorSettings::default().into()),
        (
            "gentle-glue",
            CompressorSettings {
                threshold_db: -18.0,
                ratio: 2.0,
                knee_width_db: 10.0,
                attack_ms: 50.0,
                release_ms: 300.0,
                makeup_gain_db: 3.0,
                ..Default::default()
            }
            .into(),
        ),
        ("default-limiter", LimiterSettings::default().into()),
        (
            "brickwall",
            LimiterSettings {
                threshold_db: -3.0,
                makeup_target_db: -0.3,
                knee_width_db: 0.0,
                lookahead_ms: 5.0,
                release_ms: 50.0,
                ..Default::default()
            }
            .into(),
        ),
    ]
}

/// On-disk wrapper so a preset file is a TOML table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PresetFile {
    effect: EffectSettings,
}

/// Effect preset manager
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    /// Create a new preset manager
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    fn preset_path(&self, name: &str) -> PathBuf {
        self.preset_dir.join(format!("{}.toml", name))
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<EffectSettings> {
        let path = self.preset_path(name);

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let preset: PresetFile = toml::from_str(&contents)?;
        validate_effect(&preset.effect)?;
        Ok(preset.effect)
    }

    /// Save a preset by name
    #[instrument(skip(self, settings))]
    pub async fn save_preset(&self, name: &str, settings: &EffectSettings) -> Result<()> {
        validate_effect(settings)?;
        fs::create_dir_all(&self.preset_dir).await?;

        let toml_str = toml::to_string_pretty(&PresetFile { effect: *settings })?;
        fs::write(self.preset_path(name), toml_str).await?;
        info!(name, effect = settings.name(), "Preset saved");
        Ok(())
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name);

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, name: &str) -> bool {
        self.preset_path(name).exists()
    }

    /// Write the factory presets that are not already on disk
    #[instrument(skip(self))]
    pub async fn install_factory_presets(&self) -> Result<usize> {
        let mut installed = 0;
        for (name, settings) in factory_presets() {
            if !self.preset_exists(name).await {
                self.save_preset(name, &settings).await?;
                installed += 1;
            }
        }
        Ok(installed)
    }
}

/// Configuration manager for the main Compand config
///
/// Manages the main configuration file at `~/.config/compand/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager
    ///
    /// # Arguments
    /// * `config_dir` - Configuration directory path (e.g., `~/.config/compand`)
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/compand` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("compand"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Directory holding effect presets
    pub fn preset_dir(&self) -> PathBuf {
        self.config_dir.join("presets")
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, returns factory default.
    /// If the config file is corrupt, logs an error and returns factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> CompandConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = CompandConfig::factory_default();

            // Save the factory default for next time
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match CompandConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                // Backup the corrupt config
                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                CompandConfig::factory_default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &CompandConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;

        config.save_to_file(&self.config_path).await
    }

    /// Check if config file exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
