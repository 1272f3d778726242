//! End-to-end driver: download a set, convert it, optionally archive it.
//!
//! Stages run strictly one after the other and share one cancellation
//! token. Per-sticker failures are carried in the report; only stage-level
//! errors end a run early.

mod types;

pub use types::{PipelineProgress, PipelineReport, PipelineRequest, PipelineSettings};

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::acquirer::{AcquireError, AcquireProgress, SetAcquirer};
use crate::archive::{ArchiveError, ArchiveManifest, ArchiveSplitter, SplitError};
use crate::config::Config;
use crate::converter::{ConverterError, TranscodeOrchestrator};
use crate::source::{SourceError, StickerSource, TelegramSource};

/// Directory under the set directory that receives the zips.
pub const ARCHIVES_DIR: &str = "archives";

/// Stage-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("Download stage failed: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Conversion stage failed: {0}")]
    Convert(#[from] ConverterError),

    #[error("Archive stage failed: {0}")]
    Archive(#[from] SplitError),
}

/// Runs the download, convert and archive stages for a sticker set.
pub struct StickerPipeline {
    acquirer: SetAcquirer,
    orchestrator: TranscodeOrchestrator,
    settings: PipelineSettings,
}

impl StickerPipeline {
    pub fn new(
        source: Arc<dyn StickerSource>,
        orchestrator: TranscodeOrchestrator,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            acquirer: SetAcquirer::new(source),
            orchestrator,
            settings,
        }
    }

    /// Builds a pipeline talking to the Telegram Bot API and a local ffmpeg.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let source = Arc::new(TelegramSource::new(config.telegram.clone())?);
        let orchestrator = TranscodeOrchestrator::from_config(&config.converter)?;
        Ok(Self::new(source, orchestrator, settings_from_config(config)))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Checks the source credentials before any stage runs.
    pub async fn validate(&self) -> Result<(), PipelineError> {
        self.acquirer.validate_source().await?;
        Ok(())
    }

    pub async fn run(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        self.run_with_progress(request, cancel, None).await
    }

    /// Runs the pipeline, reporting stage changes to `progress_tx`.
    ///
    /// Progress is sent with `try_send`; a slow receiver only misses updates.
    pub async fn run_with_progress(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<PipelineProgress>>,
    ) -> Result<PipelineReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, set = %request.set_name, archive = request.archive, "Pipeline started");

        let notify = |progress: PipelineProgress| {
            if let Some(ref tx) = progress_tx {
                let _ = tx.try_send(progress);
            }
        };

        let (acquire_tx, forwarder) = match progress_tx.clone() {
            Some(tx) => {
                let (acquire_tx, handle) = forward_fetch_progress(tx);
                (Some(acquire_tx), Some(handle))
            }
            None => (None, None),
        };
        let acquisition = self
            .acquirer
            .acquire_with_progress(
                &request.set_name,
                &self.settings.output_root,
                self.settings.download_concurrency,
                cancel,
                acquire_tx,
            )
            .await;
        // The acquirer has dropped its sender, so the forwarder drains and exits.
        if let Some(handle) = forwarder {
            let _ = handle.await;
        }
        let acquisition = acquisition?;

        let mut report = PipelineReport {
            run_id,
            started_at,
            finished_at: started_at,
            acquisition,
            transcode: None,
            archives: None,
            cancelled: false,
        };

        if cancel.is_cancelled() {
            return Ok(finish(report, true, notify));
        }

        notify(PipelineProgress::Converting {
            files_dir: report.acquisition.files_dir.clone(),
        });
        let transcode = self
            .orchestrator
            .convert_all(
                &report.acquisition.files_dir,
                None,
                self.settings.convert_concurrency,
                cancel,
            )
            .await?;
        let gifs_dir = transcode.output_dir.clone();
        report.transcode = Some(transcode);

        if cancel.is_cancelled() {
            return Ok(finish(report, true, notify));
        }

        if request.archive {
            notify(PipelineProgress::Archiving {
                gifs_dir: gifs_dir.clone(),
            });
            let archives_dir = report.acquisition.collection_dir.join(ARCHIVES_DIR);
            let split = ArchiveSplitter::new()
                .with_cancellation(cancel.clone())
                .split(
                    &gifs_dir,
                    &archives_dir,
                    &report.acquisition.collection.name,
                    self.settings.archive_size_limit,
                )
                .await;
            if record_archives(&mut report, split)? {
                return Ok(finish(report, true, notify));
            }
        }

        let cancelled = cancel.is_cancelled();
        Ok(finish(report, cancelled, notify))
    }
}

/// Stores the split result in `report`. Returns true when archiving was
/// cancelled; the archives closed before that are kept in the report.
fn record_archives(
    report: &mut PipelineReport,
    split: Result<ArchiveManifest, SplitError>,
) -> Result<bool, PipelineError> {
    match split {
        Ok(manifest) => {
            report.archives = Some(manifest);
            Ok(false)
        }
        Err(SplitError {
            manifest,
            source: ArchiveError::Cancelled,
        }) => {
            report.archives = Some(manifest);
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

fn finish(
    mut report: PipelineReport,
    cancelled: bool,
    notify: impl Fn(PipelineProgress),
) -> PipelineReport {
    report.cancelled = cancelled;
    report.finished_at = Utc::now();
    info!(
        run_id = %report.run_id,
        downloaded = report.acquisition.downloaded_count(),
        converted = report.transcode.as_ref().map_or(0, |t| t.converted_count()),
        archives = report.archives.as_ref().map_or(0, |a| a.len()),
        cancelled,
        duration_ms = report.duration_ms(),
        "Pipeline finished"
    );
    notify(PipelineProgress::Completed {
        run_id: report.run_id,
        all_succeeded: report.all_succeeded(),
    });
    report
}

/// Relays acquisition checkpoints as [`PipelineProgress::Fetching`].
fn forward_fetch_progress(
    tx: mpsc::Sender<PipelineProgress>,
) -> (mpsc::Sender<AcquireProgress>, JoinHandle<()>) {
    let (acquire_tx, mut acquire_rx) = mpsc::channel::<AcquireProgress>(16);
    let handle = tokio::spawn(async move {
        while let Some(progress) = acquire_rx.recv().await {
            let _ = tx.try_send(PipelineProgress::Fetching(progress));
        }
    });
    (acquire_tx, handle)
}

pub fn settings_from_config(config: &Config) -> PipelineSettings {
    PipelineSettings {
        output_root: config.download.output_root.clone(),
        download_concurrency: config.download.concurrency,
        convert_concurrency: config.converter.concurrency,
        archive_size_limit: config.archive.size_limit_bytes,
    }
}
