//! Application settings

use crate::core::session::{OscilloscopeConfig, ScanConfig, DEFAULT_SETTLE_MS, DEFAULT_STEPS};
use crate::core::transport::PortConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform configuration directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("Config file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying failure
        source: std::io::Error,
    },

    /// File is not valid TOML for [`AppConfig`]
    #[error("Config file {path} is invalid: {source}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying failure
        source: toml::de::Error,
    },

    /// Config could not be rendered as TOML
    #[error("Could not serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial port settings
    pub port: PortConfig,
    /// Scan settings used when the command line leaves them out
    pub scan: ScanDefaults,
}

/// Defaults for scan and oscilloscope parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanDefaults {
    /// Number of steps between start and stop
    pub steps: u32,
    /// Settle delay in ms
    pub settle_ms: u32,
}

impl Default for ScanDefaults {
    fn default() -> Self {
        Self {
            steps: DEFAULT_STEPS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

impl ScanDefaults {
    /// Build a scan over `start..=stop` with optional overrides
    pub fn scan(&self, start_hz: i64, stop_hz: i64, steps: Option<u32>, settle_ms: Option<u32>) -> ScanConfig {
        ScanConfig::new(start_hz, stop_hz)
            .steps(steps.unwrap_or(self.steps))
            .settle_ms(settle_ms.unwrap_or(self.settle_ms))
    }

    /// Apply the default settle delay to an oscilloscope capture
    pub fn oscilloscope(&self, config: OscilloscopeConfig, settle_ms: Option<u32>) -> OscilloscopeConfig {
        config.settle_ms(settle_ms.unwrap_or(self.settle_ms))
    }
}

impl AppConfig {
    /// Load config from the platform config directory; defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load config from `path`; defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to the platform config directory
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = super::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(io_err)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
