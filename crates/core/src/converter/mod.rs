//! Converter module for turning downloaded stickers into GIFs.
//!
//! [`GifTranscoder`] runs ffmpeg on one file through a [`CommandRunner`];
//! [`TranscodeOrchestrator`] fans it out over a directory with a bounded
//! pool. Both skip outputs that already exist.
//!
//! # Example
//!
//! ```ignore
//! use stickerpipe_core::converter::{ConverterConfig, TranscodeOrchestrator};
//!
//! let orchestrator = TranscodeOrchestrator::from_config(&ConverterConfig::default())?;
//! let report = orchestrator
//!     .convert_all(Path::new("downloads/foo/originalFiles"), None, 4, &cancel)
//!     .await?;
//! println!("{} converted, {} failed", report.converted_count(), report.failed_count());
//! ```

mod batch;
mod config;
mod error;
mod ffmpeg;
mod runner;
mod types;

pub use batch::{default_output_dir, extension_histogram, TranscodeOrchestrator, GIFS_DIR};
pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::{encoder_candidates, partial_output_path, resolve_encoder, GifTranscoder};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use types::{ExtensionCount, TranscodeOutcome, TranscodeReport};
