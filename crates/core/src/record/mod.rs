use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{RasterSurface, Result};

/// Configuration options for the frame recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub output_dir: PathBuf,
    /// Keep one frame out of every `every` rendered frames.
    pub every: u64,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("frames"),
            every: 60,
        }
    }
}

/// Dumps rendered raster frames to numbered PNG files.
#[derive(Debug, Default)]
pub struct Recorder {
    settings: RecordingSettings,
    is_recording: bool,
    captured: u64,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            is_recording: false,
            captured: 0,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.settings.output_dir)?;
        self.is_recording = true;
        tracing::info!(dir = %self.settings.output_dir.display(), "recording frames");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.is_recording = false;
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Frames handed off for encoding so far.
    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn output_dir(&self) -> &Path {
        &self.settings.output_dir
    }

    /// Copies `surface` if recording and `frame` falls on the capture
    /// interval, then encodes the PNG on the blocking pool. Must be called
    /// from within a tokio runtime.
    pub fn capture(
        &mut self,
        frame: u64,
        surface: &RasterSurface,
    ) -> Option<JoinHandle<Result<PathBuf>>> {
        if !self.is_recording || frame % self.settings.every.max(1) != 0 {
            return None;
        }

        let path = self
            .settings
            .output_dir
            .join(format!("frame-{frame:06}.png"));
        let image = surface.image().clone();
        self.captured += 1;

        Some(tokio::task::spawn_blocking(move || {
            match image.save_with_format(&path, ImageFormat::Png) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "saved frame");
                    Ok(path)
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to save frame");
                    Err(err.into())
                }
            }
        }))
    }
}
