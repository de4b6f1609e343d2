//! Configuration for the interception layer
//!
//! Settings live in a TOML file next to the host executable:
//! `<host dir>/addons/framehook/framehook.toml`. A default file is written
//! the first time the layer loads. The `-ggvanilla` command line switch
//! overrides the file and disables installation.
//!
//! # Example
//!
//! ```ignore
//! use framehook_core::HookConfig;
//!
//! let mut config = HookConfig::load_or_default();
//! config.apply_args(std::env::args());
//! if !config.bypass {
//!     // install hooks
//! }
//! ```

mod loader;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::frame::FrameSettings;

pub use loader::{config_path, config_path_in, host_dir};

/// Command line switch that disables installation
pub const BYPASS_ARG: &str = "-ggvanilla";

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Could not determine the host directory
    #[error("Config directory not available - could not resolve host executable path")]
    NoConfigDirectory,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Interception layer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    /// Leave the host untouched
    pub bypass: bool,

    /// Also intercept `IDXGISwapChain1::Present1`
    pub hook_present1: bool,

    /// Skipped frames logged before skips are only counted
    pub skip_log_limit: u32,

    /// Frames between heartbeat log lines (0 disables)
    pub heartbeat_interval: u64,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debug: false,
            bypass: false,
            hook_present1: true,
            skip_log_limit: 5,
            heartbeat_interval: 120,
        }
    }
}

impl HookConfig {
    /// Load config from the default location, creating it if missing.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load config from `path`, writing a default file if none exists.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded config from {:?}", path);
            Ok(config)
        } else {
            let default = Self::default();
            default.save_to(path)?;
            tracing::info!("Created default config at {:?}", path);
            Ok(default)
        }
    }

    /// Load config, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Using default config: {}", e);
            Self::default()
        })
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved config to {:?}", path);
        Ok(())
    }

    /// Merge command line switches into the config
    pub fn apply_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if args
            .into_iter()
            .any(|arg| arg.as_ref().eq_ignore_ascii_case(BYPASS_ARG))
        {
            tracing::info!("{} given, interception disabled", BYPASS_ARG);
            self.bypass = true;
        }
    }

    /// Per-frame settings derived from this config
    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            skip_log_limit: u64::from(self.skip_log_limit),
            heartbeat_interval: self.heartbeat_interval,
        }
    }
}
