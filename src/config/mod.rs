//! Configuration module
//!
//! Handles the persisted port and scan defaults

mod settings;

pub use settings::{AppConfig, ConfigError, ScanDefaults};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("uk", "m0cuv", "antenna-analyser")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default location of `config.toml`
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
