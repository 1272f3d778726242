//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the FFmpeg-based GIF converter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary. Resolved from the host platform when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,

    /// Frame rate cap of the produced GIF.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Output width in pixels, or -1 to keep the source width.
    #[serde(default = "default_width")]
    pub width: i32,

    /// Maximum parallel conversions.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_fps() -> u32 {
    60
}

fn default_width() -> i32 {
    -1
}

fn default_concurrency() -> usize {
    4
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            fps: default_fps(),
            width: default_width(),
            concurrency: default_concurrency(),
        }
    }
}

impl ConverterConfig {
    /// Creates a config with an explicit ffmpeg path.
    pub fn with_ffmpeg_path(ffmpeg_path: PathBuf) -> Self {
        Self {
            ffmpeg_path: Some(ffmpeg_path),
            ..Default::default()
        }
    }

    /// Sets the frame rate cap.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Sets the output width.
    pub fn with_width(mut self, width: i32) -> Self {
        self.width = width;
        self
    }

    /// Sets the maximum parallel conversions.
    pub fn with_concurrency(mut self, max: usize) -> Self {
        self.concurrency = max;
        self
    }
}
