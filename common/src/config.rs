use serde::Deserialize;
use std::path::Path;

use crate::capture::{CaptureConfiguration, CaptureTarget, PixelSize};
use crate::gpu::{DeviceDescriptor, DeviceFeatures, DeviceLimits};
use crate::settings::RenderSettings;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub gpu: GpuConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_backend")]
    pub backend: String,
    #[serde(default)]
    pub target: CaptureTarget,
    #[serde(default = "default_capture_fps")]
    pub fps: u32,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: u32,
    #[serde(default)]
    pub shows_cursor: bool,
    pub preferred_width: Option<u32>,
    pub preferred_height: Option<u32>,
    #[serde(default = "default_source_display_width")]
    pub display_width: u32,
    #[serde(default = "default_source_display_height")]
    pub display_height: u32,
    #[serde(default = "default_source_window_width")]
    pub window_width: u32,
    #[serde(default = "default_source_window_height")]
    pub window_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: default_capture_backend(),
            target: CaptureTarget::default(),
            fps: default_capture_fps(),
            queue_depth: default_queue_depth(),
            shows_cursor: false,
            preferred_width: None,
            preferred_height: None,
            display_width: default_source_display_width(),
            display_height: default_source_display_height(),
            window_width: default_source_window_width(),
            window_height: default_source_window_height(),
        }
    }
}

impl CaptureConfig {
    /// Producer-side parameters. Queue depth is kept within 1..=8 and the
    /// preferred size only applies when both dimensions are set.
    pub fn capture_configuration(&self) -> CaptureConfiguration {
        let preferred_pixel_size = match (self.preferred_width, self.preferred_height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => {
                Some(PixelSize { width, height })
            }
            _ => None,
        };
        CaptureConfiguration {
            frames_per_second: self.fps.max(1),
            queue_depth: self.queue_depth.clamp(1, 8),
            shows_cursor: self.shows_cursor,
            preferred_pixel_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_width")]
    pub width: u32,
    #[serde(default = "default_display_height")]
    pub height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_display_width(),
            height: default_display_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GpuConfig {
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_max_texture_dimension")]
    pub max_texture_dimension: u32,
    #[serde(default = "default_true")]
    pub compute: bool,
    #[serde(default = "default_true")]
    pub spatial_scaler: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_texture_dimension: default_max_texture_dimension(),
            compute: true,
            spatial_scaler: true,
        }
    }
}

impl GpuConfig {
    pub fn device_descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            threads: self.threads,
            features: DeviceFeatures {
                render: true,
                compute: self.compute,
                spatial_scaler: self.spatial_scaler,
            },
            limits: DeviceLimits {
                max_texture_dimension: self.max_texture_dimension,
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
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

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_api_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_api_bind(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_capture_backend() -> String {
    "synthetic".into()
}
fn default_capture_fps() -> u32 {
    30
}
fn default_queue_depth() -> u32 {
    5
}
fn default_source_display_width() -> u32 {
    1920
}
fn default_source_display_height() -> u32 {
    1080
}
fn default_source_window_width() -> u32 {
    1280
}
fn default_source_window_height() -> u32 {
    720
}
fn default_display_width() -> u32 {
    2560
}
fn default_display_height() -> u32 {
    1440
}
fn default_max_texture_dimension() -> u32 {
    16384
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
fn default_api_bind() -> String {
    "127.0.0.1:8090".into()
}
