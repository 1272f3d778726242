//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

use crate::pool::PoolError;

/// Errors that stop a conversion run or a single encoder invocation.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// No encoder location is known for this host platform.
    #[error("No ffmpeg location known for platform: {os}")]
    UnsupportedPlatform { os: String },

    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// Input file or directory not found.
    #[error("Input not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Output directory does not exist and could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while running the encoder.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid concurrency setting.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Job was cancelled.
    #[error("Conversion cancelled")]
    Cancelled,
}

impl ConverterError {
    /// Whether the error is raised before any encoder runs.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPlatform { .. }
                | Self::InputNotFound { .. }
                | Self::OutputDirectoryFailed { .. }
                | Self::Pool(_)
        )
    }
}
