// src/config.rs

//! Configuration for the OPL host runtime.
//!
//! Every section carries `#[serde(default)]`, so a configuration file only
//! needs to name the settings it changes. Files are JSON.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::graphics::{GraphicsMode, Size};

/// Default configuration, built on first use.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::default);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Root of the runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Emulated screen settings.
    pub screen: ScreenConfig,
    /// Busy and info-print overlay timing.
    pub overlays: OverlayConfig,
    /// Sound playback settings.
    pub audio: AudioConfig,
    /// Host event-loop settings.
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` if given, falling back to defaults when it is missing or invalid.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(config) => {
                    log::info!("Config: loaded {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Config: {:#}, using defaults", anyhow::Error::from(e));
                    CONFIG.clone()
                }
            },
            None => CONFIG.clone(),
        }
    }
}

/// The emulated device screen. Its size and mode define the default window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
    pub mode: GraphicsMode,
}

impl ScreenConfig {
    pub fn size(&self) -> Size {
        Size::new(
            self.width.min(i32::MAX as u32) as i32,
            self.height.min(i32::MAX as u32) as i32,
        )
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        // Series 5 screen
        ScreenConfig {
            width: 640,
            height: 240,
            mode: GraphicsMode::Gray16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    /// How long an info-print stays on screen.
    pub info_print_duration_ms: u64,
    /// Delay used by hosts that show the busy overlay without an explicit delay.
    pub default_busy_delay_ms: u64,
}

impl OverlayConfig {
    pub fn info_print_duration(&self) -> Duration {
        Duration::from_millis(self.info_print_duration_ms)
    }

    pub fn default_busy_delay(&self) -> Duration {
        Duration::from_millis(self.default_busy_delay_ms)
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            info_print_duration_ms: 2000,
            default_busy_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate assumed for sound buffers that do not carry one.
    pub sample_rate: u32,
    /// Frames written to the sink per render-loop iteration. Cancellation is
    /// observed between chunks.
    pub chunk_frames: usize,
    /// When true the null sink sleeps for the duration of each chunk.
    pub real_time_pacing: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            sample_rate: 8000,
            chunk_frames: 256,
            real_time_pacing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on a single host-side wait before it re-checks for shutdown.
    pub wait_poll_ms: u64,
}

impl SchedulerConfig {
    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { wait_poll_ms: 250 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "screen": {{ "width": 480 }}, "overlays": {{ "info_print_duration_ms": 750 }} }}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.screen.width, 480);
        assert_eq!(config.screen.height, 240);
        assert_eq!(config.overlays.info_print_duration(), Duration::from_millis(750));
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test_log::test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Some(Path::new("/nonexistent/opl-host.json")));
        assert_eq!(config, Config::default());
    }
}
