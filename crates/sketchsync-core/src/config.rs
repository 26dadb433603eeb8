//! Configuration loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Top-level SketchSync configuration.
///
/// Every section is optional; missing values fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<SnapshotConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CANVAS_WIDTH: u32 = 1280;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 720;
pub const DEFAULT_BACKGROUND: &str = "#ffffff";

/// Shared canvas dimensions. Fixed for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// CSS-style colour used for `clear` and `erase`.
    #[serde(default = "default_background")]
    pub background: String,
}

fn default_width() -> u32 {
    DEFAULT_CANVAS_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_CANVAS_HEIGHT
}

fn default_background() -> String {
    DEFAULT_BACKGROUND.to_string()
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            background: default_background(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Persist snapshots on `join` and before `clear` (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for persisted PNGs. `~` is expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. "info" or "sketchsync_gateway=debug".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json: bool,
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| CoreError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw)?;

        let config: Config =
            json5::from_str(&substituted).map_err(|e| CoreError::ConfigParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let (width, height) = self.canvas_size();
        if width == 0 || height == 0 {
            return Err(CoreError::Config(format!(
                "canvas size must be non-zero, got {width}x{height}"
            )));
        }
        Ok(())
    }

    /// Default config file path: `~/.sketchsync/config.json`.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn bind_addr(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn canvas(&self) -> CanvasConfig {
        self.canvas.clone().unwrap_or_default()
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        let canvas = self.canvas();
        (canvas.width, canvas.height)
    }

    pub fn snapshots_enabled(&self) -> bool {
        self.snapshots.as_ref().map(|s| s.enabled).unwrap_or(true)
    }

    /// Resolve the snapshot directory.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshots
            .as_ref()
            .and_then(|s| s.dir.as_ref())
            .map(|d| PathBuf::from(shellexpand::tilde(d).as_ref()))
            .unwrap_or_else(|| data_dir().join("snapshots"))
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    pub fn log_json(&self) -> bool {
        self.logging.as_ref().map(|l| l.json).unwrap_or(false)
    }
}

/// Base directory for SketchSync state: `~/.sketchsync`.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sketchsync")
}
