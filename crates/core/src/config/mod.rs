use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Result, VisualizationMode};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub render: RenderConfig,
    pub source: SourceConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let config = serde_json::from_slice(&raw)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Number of frequency bins in every snapshot. The transform size is
    /// twice this value.
    pub bin_count: usize,
    pub default_volume: f32,
    /// Frames pushed through the graph per playback block.
    pub block_size: usize,
    /// Weight of the previous snapshot when smoothing magnitudes, in `[0, 1)`.
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            bin_count: 128,
            default_volume: 0.7,
            block_size: 1024,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AudioConfig {
    pub fn fft_size(&self) -> usize {
        self.bin_count * 2
    }
}

/// Canvas geometry and per-mode drawing constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub mode: VisualizationMode,
    /// Distance a column cap falls per frame.
    pub decay_step: f32,
    /// Gap kept between a rising cap and the bar below it.
    pub rise_margin: f32,
    /// Upper bound for the dot radius at full magnitude.
    pub dot_measure_max: f32,
    pub circle_base_radius: f32,
    pub circle_min_radius: f32,
    pub circle_line_width: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fps: 60,
            mode: VisualizationMode::Column,
            decay_step: 5.0,
            rise_margin: 40.0,
            dot_measure_max: 50.0,
            circle_base_radius: 100.0,
            circle_min_radius: 200.0,
            circle_line_width: 6.0,
        }
    }
}

/// Where track bytes and cover art come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub media_dir: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            media_dir: None,
        }
    }
}
