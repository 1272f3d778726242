//! FFmpeg-based GIF transcoder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::runner::{CommandRunner, ProcessRunner};
use super::types::TranscodeOutcome;

/// Known encoder locations for a host OS, in lookup order.
///
/// Returns `None` for platforms with no known location.
pub fn encoder_candidates(os: &str) -> Option<Vec<PathBuf>> {
    let candidates: &[&str] = match os {
        "linux" => &["/usr/local/bin/ffmpeg", "/usr/bin/ffmpeg", "ffmpeg"],
        "macos" => &["/opt/homebrew/bin/ffmpeg", "/usr/local/bin/ffmpeg", "ffmpeg"],
        "windows" => &["ffmpeg.exe"],
        _ => return None,
    };
    Some(candidates.iter().map(PathBuf::from).collect())
}

/// Resolves the encoder binary for the current host.
///
/// A configured path always wins. Otherwise the first existing candidate for
/// the host OS is used, falling back to the bare program name so the `PATH`
/// is searched when the process is spawned.
pub fn resolve_encoder(config: &ConverterConfig) -> Result<PathBuf, ConverterError> {
    resolve_encoder_for(std::env::consts::OS, config.ffmpeg_path.as_deref(), |p| {
        p.is_file()
    })
}

fn resolve_encoder_for(
    os: &str,
    configured: Option<&Path>,
    exists: impl Fn(&Path) -> bool,
) -> Result<PathBuf, ConverterError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }

    let candidates = encoder_candidates(os).ok_or_else(|| ConverterError::UnsupportedPlatform {
        os: os.to_string(),
    })?;

    let resolved = candidates
        .iter()
        .find(|c| c.is_absolute() && exists(c))
        .or_else(|| candidates.iter().find(|c| !c.is_absolute()))
        .cloned()
        .ok_or_else(|| ConverterError::UnsupportedPlatform { os: os.to_string() })?;

    debug!("Resolved ffmpeg for {} to {}", os, resolved.display());
    Ok(resolved)
}

/// Path the encoder writes to before the result is renamed onto `output`.
///
/// `foo.gif` becomes `.foo.gif.part`. Outputs always end in `.gif`, so a
/// partial file never shares a path with another input's output. The muxer
/// is forced with `-f gif` since the name no longer implies it.
pub fn partial_output_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{}.part", name))
}

/// Converts single files to looping GIFs with ffmpeg.
#[derive(Clone)]
pub struct GifTranscoder {
    runner: Arc<dyn CommandRunner>,
    encoder: PathBuf,
    fps: u32,
    width: i32,
}

impl GifTranscoder {
    pub fn new(runner: Arc<dyn CommandRunner>, encoder: PathBuf, fps: u32, width: i32) -> Self {
        Self {
            runner,
            encoder,
            fps,
            width,
        }
    }

    /// Builds a transcoder that spawns real processes, resolving the encoder
    /// for the current host.
    pub fn from_config(config: &ConverterConfig) -> Result<Self, ConverterError> {
        Self::with_runner(config, Arc::new(ProcessRunner::new()))
    }

    /// Like [`from_config`](Self::from_config) with a custom runner.
    pub fn with_runner(
        config: &ConverterConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ConverterError> {
        let encoder = resolve_encoder(config)?;
        Ok(Self::new(runner, encoder, config.fps, config.width))
    }

    pub fn encoder(&self) -> &Path {
        &self.encoder
    }

    /// The `-vf` filter graph: frame-rate cap, Lanczos scaling and a two-pass
    /// palette.
    pub fn filter_graph(&self) -> String {
        format!(
            "fps=fps={}:round=up,scale={}:-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse",
            self.fps, self.width
        )
    }

    /// Full argument list for one encode.
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vf".to_string(),
            self.filter_graph(),
            "-loop".to_string(),
            "0".to_string(),
            "-f".to_string(),
            "gif".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    /// Converts `input` into `output`.
    ///
    /// An existing `output` is skipped without running the encoder. Errors are
    /// reported in the outcome and never returned.
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> TranscodeOutcome {
        match tokio::fs::try_exists(output).await {
            Ok(true) => {
                debug!("Skipping {}, output exists", output.display());
                return TranscodeOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => return TranscodeOutcome::failed(format!("Cannot stat output: {}", e)),
        }

        let partial = partial_output_path(output);
        let args = self.build_args(input, &partial);

        let outcome = match self.runner.run(&self.encoder, &args, cancel).await {
            Ok(result) if result.success() => match tokio::fs::rename(&partial, output).await {
                Ok(()) => return TranscodeOutcome::Converted,
                Err(e) => TranscodeOutcome::failed(format!(
                    "Encoder exited successfully but output could not be moved into place: {}",
                    e
                )),
            },
            Ok(result) => {
                warn!(
                    input = %input.display(),
                    exit_code = ?result.exit_code,
                    "ffmpeg failed"
                );
                TranscodeOutcome::Failed {
                    exit_code: result.exit_code,
                    stderr: result.stderr,
                }
            }
            Err(ConverterError::Cancelled) => TranscodeOutcome::Cancelled,
            Err(e) => TranscodeOutcome::failed(e.to_string()),
        };

        let _ = tokio::fs::remove_file(&partial).await;
        outcome
    }
}
