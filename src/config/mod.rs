//! Configuration module for PortVis-RS
//!
//! This module handles the configuration for the port graph monitor:
//! - Which per-port attributes are read on each refresh
//! - Whether the background worker polls in addition to notifications
//! - Queue capacities between the monitor, its worker and the consumer
//! - Layout spacing for the auto-positioning pass
//! - Logging filter and optional log file
//!
//! # Config Location
//!
//! The default config file lives in the platform-appropriate config directory
//! under `dev.hxyulin.portvis-rs/config.toml`:
//! - **Linux**: `~/.config/dev.hxyulin.portvis-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.portvis-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.portvis-rs\`
//!
//! # Example
//!
//! ```ignore
//! use portvis_rs::config::AppConfig;
//!
//! let config = AppConfig::load_or_default(AppConfig::default_config_path());
//! let params = config.layout.params();
//! ```

use crate::error::{PortVisError, Result, ResultExt};
use crate::layout::{LayoutParams, NODE_HEIGHT, NODE_WIDTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.portvis-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Attributes read for every port on each refresh
pub const DEFAULT_PORT_INFORMATION_ATTRS: [&str; 3] =
    ["plugin_type", "ad_core_version", "driver_version"];

/// Default capacity of the worker's message queue to the consumer
pub const DEFAULT_MESSAGE_CHANNEL_CAPACITY: usize = 1024;

/// Default capacity of the pending refresh request queue
pub const DEFAULT_REQUEST_CHANNEL_CAPACITY: usize = 16;

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    /// Graph monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Layout configuration
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file, if the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PortVisError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(PortVisError::from)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("In {:?}", path))
    }

    /// Load a config file, returning defaults if it is missing or invalid
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to disk as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(PortVisError::from)
                    .context("Failed to create config directory")?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PortVisError::Serialization(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(PortVisError::from)
            .with_context(|| format!("Failed to write config file {:?}", path))
    }
}

// ==================== Monitor Config ====================

/// Graph monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Attributes collected into each port's information map
    pub attribute_names: Vec<String>,

    /// Background poll interval in milliseconds (0 = notifications and manual refresh only)
    pub poll_interval_ms: u64,

    /// Capacity of the worker's message queue; a full queue holds the worker back
    pub message_channel_capacity: usize,

    /// Capacity of the pending refresh request queue
    pub request_channel_capacity: usize,
}

impl MonitorConfig {
    /// Poll interval, if polling is enabled
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            attribute_names: DEFAULT_PORT_INFORMATION_ATTRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            poll_interval_ms: 0,
            message_channel_capacity: DEFAULT_MESSAGE_CHANNEL_CAPACITY,
            request_channel_capacity: DEFAULT_REQUEST_CHANNEL_CAPACITY,
        }
    }
}

// ==================== Layout Config ====================

/// Spacing and origin for auto-positioning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Horizontal offset between a port and its children
    pub x_spacing: f64,

    /// Vertical offset between siblings
    pub y_spacing: f64,

    /// Starting x position
    pub x0: f64,

    /// Starting y position
    pub y0: f64,

    /// Recompute positions after every applied report
    pub auto_position: bool,
}

impl LayoutConfig {
    /// Layout parameters described by this config
    pub fn params(&self) -> LayoutParams {
        LayoutParams {
            x_spacing: self.x_spacing,
            y_spacing: self.y_spacing,
            x0: self.x0,
            y0: self.y0,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            x_spacing: NODE_WIDTH * 1.5,
            y_spacing: NODE_HEIGHT * 1.5,
            x0: 0.0,
            y0: 0.0,
            auto_position: true,
        }
    }
}

// ==================== Logging Config ====================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,

    /// Optional log file (rolled daily)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,portvis_rs=debug".to_string(),
            file: None,
        }
    }
}

// ==================== Tests ====================
