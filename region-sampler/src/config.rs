//! Sampler settings.
//!
//! Everything is optional: a missing file, table or key takes the default
//! below. The `[demo]` table only drives the synthetic scene of the binary.

use crate::types::{Rect, SamplingError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the sampler is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Name given to the worker thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
        }
    }
}

/// Settings for the synthetic compositor driven by the demo binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Time between simulated display refreshes
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,

    /// Number of refreshes before exiting
    #[serde(default = "default_frames")]
    pub frames: u64,

    /// Synthetic display size
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Regions registered with the sampler
    #[serde(default = "default_regions")]
    pub regions: Vec<Rect>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval(),
            frames: default_frames(),
            width: default_width(),
            height: default_height(),
            regions: default_regions(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_thread_name() -> String {
    "RegionSamplingThread".to_string()
}

fn default_frame_interval() -> u64 {
    16
}

fn default_frames() -> u64 {
    120
}

fn default_width() -> u32 {
    1080
}

fn default_height() -> u32 {
    1920
}

fn default_regions() -> Vec<Rect> {
    vec![
        // Status bar
        Rect::new(0, 0, 1080, 96),
        // Navigation bar, overlapping the bottom of the content
        Rect::new(0, 1776, 1080, 1920),
    ]
}

impl Config {
    /// Read `path`, falling back to defaults when it is missing or malformed
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::read(path) {
            Ok(Some(config)) => {
                info!("Using configuration at {}", path.display());
                config
            }
            Ok(None) => {
                info!("{} not present, running with defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse the file at `path`; `Ok(None)` if there is no such file
    pub fn read(path: &Path) -> Result<Option<Self>, SamplingError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(toml::from_str(&contents)?))
    }

    /// `region-sampler/config.toml` under the platform config directory
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join(env!("CARGO_PKG_NAME")).join("config.toml")
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), SamplingError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        debug!("Wrote configuration to {}", path.display());
        Ok(())
    }
}
