//! Fans the transcoder out over a directory or a single file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::ffmpeg::GifTranscoder;
use super::types::{ExtensionCount, TranscodeOutcome, TranscodeReport};
use crate::pool::{UnitResult, WorkPool};

/// Name of the output directory created next to the source directory.
pub const GIFS_DIR: &str = "gifs";

/// Converts batches of stickers to GIFs.
#[derive(Clone)]
pub struct TranscodeOrchestrator {
    transcoder: GifTranscoder,
}

impl TranscodeOrchestrator {
    pub fn new(transcoder: GifTranscoder) -> Self {
        Self { transcoder }
    }

    /// Builds an orchestrator around a process-spawning transcoder.
    pub fn from_config(config: &ConverterConfig) -> Result<Self, ConverterError> {
        Ok(Self::new(GifTranscoder::from_config(config)?))
    }

    pub fn transcoder(&self) -> &GifTranscoder {
        &self.transcoder
    }

    /// Converts every regular file directly inside `input`, or `input` itself
    /// when it is a file.
    ///
    /// Outputs go to `output_dir`, or to a `gifs` directory next to the
    /// source directory when unset. Per-file failures are reported in the
    /// returned report; only precondition failures are returned as errors.
    pub async fn convert_all(
        &self,
        input: &Path,
        output_dir: Option<&Path>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<TranscodeReport, ConverterError> {
        let pool = WorkPool::new("transcode", concurrency)?;
        let start = Instant::now();

        let (source_dir, inputs) = collect_inputs(input).await?;
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_output_dir(&source_dir),
        };
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| ConverterError::OutputDirectoryFailed {
                path: output_dir.clone(),
                source,
            })?;

        let histogram = extension_histogram(&inputs);
        info!(
            files = inputs.len(),
            encoder = %self.transcoder.encoder().display(),
            "Converting {} into {}: {}",
            input.display(),
            output_dir.display(),
            format_histogram(&histogram)
        );

        let outputs = output_paths(&inputs, &output_dir);

        let units = inputs
            .iter()
            .cloned()
            .zip(outputs.iter().cloned())
            .map(|(input, output)| {
                let transcoder = self.transcoder.clone();
                move |token: CancellationToken| async move {
                    transcoder.convert(&input, &output, &token).await
                }
            });

        let outcomes: Vec<TranscodeOutcome> = pool
            .run(units, cancel)
            .await
            .into_iter()
            .map(|result| match result {
                UnitResult::Completed(outcome) => outcome,
                UnitResult::Cancelled => TranscodeOutcome::Cancelled,
                UnitResult::Panicked(message) => TranscodeOutcome::failed(message),
            })
            .collect();

        for (input, outcome) in inputs.iter().zip(&outcomes) {
            if let TranscodeOutcome::Failed { exit_code, stderr } = outcome {
                warn!(
                    input = %input.display(),
                    exit_code = ?exit_code,
                    "Conversion failed: {}",
                    stderr.trim()
                );
            }
        }

        let report = TranscodeReport {
            output_dir,
            inputs,
            outputs,
            outcomes,
            histogram,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            converted = report.converted_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            cancelled = report.cancelled_count(),
            duration_ms = report.duration_ms,
            "Conversion finished"
        );

        Ok(report)
    }
}

/// Returns the directory the inputs live in and the sorted input files.
async fn collect_inputs(input: &Path) -> Result<(PathBuf, Vec<PathBuf>), ConverterError> {
    let metadata = tokio::fs::metadata(input)
        .await
        .map_err(|_| ConverterError::InputNotFound {
            path: input.to_path_buf(),
        })?;

    if metadata.is_file() {
        let parent = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        return Ok((parent, vec![input.to_path_buf()]));
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(input).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok((input.to_path_buf(), files))
}

/// `<source_dir>/../gifs`, the sibling of the source directory.
pub fn default_output_dir(source_dir: &Path) -> PathBuf {
    match source_dir.parent() {
        Some(parent) => parent.join(GIFS_DIR),
        None => source_dir.join(GIFS_DIR),
    }
}

/// `foo.webm` maps to `foo.gif`. Inputs whose names would collide keep their
/// full file name instead (`foo.tgs.gif`), repeated until every output path is
/// unique, so no two workers write the same path.
fn output_paths(inputs: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
    let mut full_name = vec![false; inputs.len()];
    loop {
        let names: Vec<String> = inputs
            .iter()
            .zip(&full_name)
            .map(|(input, &full)| {
                if full {
                    format!("{}.gif", file_name_of(input))
                } else {
                    format!("{}.gif", stem_of(input))
                }
            })
            .collect();

        let mut owners: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, name) in names.iter().enumerate() {
            owners.entry(name.as_str()).or_default().push(i);
        }
        let mut changed = false;
        for indices in owners.values().filter(|v| v.len() > 1) {
            for &i in indices {
                changed |= !full_name[i];
                full_name[i] = true;
            }
        }

        if !changed {
            return names.into_iter().map(|n| output_dir.join(n)).collect();
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Counts input files by lower-cased extension, most frequent first.
pub fn extension_histogram(inputs: &[PathBuf]) -> Vec<ExtensionCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for input in inputs {
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        *counts.entry(ext).or_default() += 1;
    }

    let mut histogram: Vec<ExtensionCount> = counts
        .into_iter()
        .map(|(extension, count)| ExtensionCount { extension, count })
        .collect();
    histogram.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.extension.cmp(&b.extension)));
    histogram
}

fn format_histogram(histogram: &[ExtensionCount]) -> String {
    if histogram.is_empty() {
        return "no files".to_string();
    }
    histogram
        .iter()
        .map(|h| {
            let ext = if h.extension.is_empty() {
                "(none)"
            } else {
                h.extension.as_str()
            };
            format!("{}: {}", ext, h.count)
        })
        .collect::<Vec<_>>()
        .join(", ")
}
