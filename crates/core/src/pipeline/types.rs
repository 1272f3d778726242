//! Types for the pipeline module.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::acquirer::{AcquireProgress, AcquisitionReport};
use crate::archive::ArchiveManifest;
use crate::converter::TranscodeReport;

/// Settings shared by every run of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Root under which `<set>/originalFiles` and `<set>/gifs` are created.
    pub output_root: PathBuf,
    pub download_concurrency: usize,
    pub convert_concurrency: usize,
    pub archive_size_limit: u64,
}

/// One pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    /// Set name as known to the source.
    pub set_name: String,
    /// Pack the GIFs into size-bounded zips after converting.
    pub archive: bool,
}

impl PipelineRequest {
    pub fn new(set_name: impl Into<String>) -> Self {
        Self {
            set_name: set_name.into(),
            archive: false,
        }
    }

    pub fn with_archive(mut self) -> Self {
        self.archive = true;
        self
    }
}

/// Stage updates sent while a run is in progress.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineProgress {
    Fetching(AcquireProgress),
    Converting { files_dir: PathBuf },
    Archiving { gifs_dir: PathBuf },
    Completed { run_id: Uuid, all_succeeded: bool },
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub acquisition: AcquisitionReport,
    /// `None` when the run was cancelled before converting.
    pub transcode: Option<TranscodeReport>,
    /// `None` unless archiving was requested and reached.
    pub archives: Option<ArchiveManifest>,
    pub cancelled: bool,
}

impl PipelineReport {
    /// True when every sticker was downloaded and converted and nothing was
    /// cancelled.
    pub fn all_succeeded(&self) -> bool {
        !self.cancelled
            && self.acquisition.all_succeeded()
            && self
                .transcode
                .as_ref()
                .is_some_and(TranscodeReport::all_succeeded)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
