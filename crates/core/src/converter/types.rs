//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of converting one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TranscodeOutcome {
    /// The output file already existed.
    Skipped,
    /// The encoder exited successfully.
    Converted,
    /// The encoder failed. `stderr` holds everything it printed.
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The run was cancelled before or during the encode.
    Cancelled,
}

impl TranscodeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            exit_code: None,
            stderr: message.into(),
        }
    }
}

/// Count of input files sharing an extension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionCount {
    /// Lower-cased extension without the dot; empty when the file has none.
    pub extension: String,
    pub count: usize,
}

/// Result of converting a directory or a single file.
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeReport {
    /// Directory the GIFs were written to.
    pub output_dir: PathBuf,
    pub inputs: Vec<PathBuf>,
    /// Output path of each input, index-aligned with `inputs`.
    pub outputs: Vec<PathBuf>,
    pub outcomes: Vec<TranscodeOutcome>,
    /// Input extensions, most frequent first.
    pub histogram: Vec<ExtensionCount>,
    pub duration_ms: u64,
}

impl TranscodeReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn converted_count(&self) -> usize {
        self.count(|o| matches!(o, TranscodeOutcome::Converted))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, TranscodeOutcome::Skipped))
    }

    pub fn failed_count(&self) -> usize {
        self.count(TranscodeOutcome::is_failure)
    }

    pub fn cancelled_count(&self) -> usize {
        self.count(|o| matches!(o, TranscodeOutcome::Cancelled))
    }

    /// True when every input has a GIF on disk.
    pub fn all_succeeded(&self) -> bool {
        self.converted_count() + self.skipped_count() == self.total()
    }

    fn count(&self, pred: impl Fn(&TranscodeOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}
