//! Configuration management for the Cadence audio player
//!
//! Bootstrap configuration comes from a TOML file and cannot change while the
//! player runs. Settings sources, highest priority first:
//!
//! 1. Command-line arguments (`--port`, `--database`, `--headless`, `--device`)
//! 2. Environment variables (handled by clap's `env` attributes)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use cadence_common::config::{default_data_dir, load_toml_or_default};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to SQLite database file; defaults to the OS data directory
    pub database_path: Option<PathBuf>,

    /// HTTP server port
    pub port: u16,

    /// Preferred output device name; the system default is used when absent
    /// or not found
    pub audio_device: Option<String>,

    /// Run without an audio device (clock-driven output)
    pub headless: bool,

    pub logging: LoggingConfig,

    pub playback: PlaybackTuning,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            port: default_port(),
            audio_device: None,
            headless: false,
            logging: LoggingConfig::default(),
            playback: PlaybackTuning::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    5740
}

fn default_log_level() -> String {
    "cadence_ap=info".to_string()
}

/// Timing constants for fades, ticks and transitions
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackTuning {
    /// Overlap between consecutive tracks on auto-advance and `next()`
    pub crossfade_secs: f64,
    /// Fade used for pause, resume, and cold starts
    pub short_fade_secs: f64,
    /// Number of discrete gain steps per fade
    pub fade_steps: u32,
    /// Position ticker cadence
    pub tick_hz: u32,
    /// Window after a seek during which end-of-source signals are ignored
    pub seek_grace_secs: f64,
    /// `previous()` restarts the current track when past this point
    pub restart_threshold_secs: f64,
    /// Broadcast capacity of the event bus
    pub event_capacity: usize,
}

impl Default for PlaybackTuning {
    fn default() -> Self {
        Self {
            crossfade_secs: 4.0,
            short_fade_secs: 0.5,
            fade_steps: 20,
            tick_hz: 4,
            seek_grace_secs: 0.2,
            restart_threshold_secs: 3.0,
            event_capacity: 256,
        }
    }
}

impl PlaybackTuning {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tick_hz == 0 {
            return Err(Error::Config("tick_hz must be positive".to_string()));
        }
        if self.fade_steps == 0 {
            return Err(Error::Config("fade_steps must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be positive".to_string()));
        }
        for (name, value) in [
            ("crossfade_secs", self.crossfade_secs),
            ("short_fade_secs", self.short_fade_secs),
            ("seek_grace_secs", self.seek_grace_secs),
            ("restart_threshold_secs", self.restart_threshold_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn crossfade(&self) -> Duration {
        Duration::from_secs_f64(self.crossfade_secs)
    }

    pub fn short_fade(&self) -> Duration {
        Duration::from_secs_f64(self.short_fade_secs)
    }

    pub fn seek_grace(&self) -> Duration {
        Duration::from_secs_f64(self.seek_grace_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub audio_device: Option<String>,
    pub headless: bool,
}

/// Resolved configuration for one run of the player
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub port: u16,
    pub audio_device: Option<String>,
    pub headless: bool,
    pub logging: LoggingConfig,
    pub playback: PlaybackTuning,
}

impl Config {
    /// Load configuration from an optional TOML file, then apply overrides
    ///
    /// A missing file yields built-in defaults. A malformed file or invalid
    /// tuning values are errors.
    pub fn load(toml_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config: TomlConfig = load_toml_or_default(toml_path)?;
        let config = Self::from_toml(toml_config, overrides);
        config.playback.validate()?;

        info!(
            "Configuration: port={}, database={}, headless={}",
            config.port,
            config.database_path.display(),
            config.headless
        );
        Ok(config)
    }

    fn from_toml(toml_config: TomlConfig, overrides: ConfigOverrides) -> Self {
        let database_path = overrides
            .database_path
            .or(toml_config.database_path)
            .unwrap_or_else(|| default_data_dir().join("cadence.db"));

        Self {
            database_path,
            port: overrides.port.unwrap_or(toml_config.port),
            audio_device: overrides.audio_device.or(toml_config.audio_device),
            headless: overrides.headless || toml_config.headless,
            logging: toml_config.logging,
            playback: toml_config.playback,
        }
    }
}
