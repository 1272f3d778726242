//! Set acquirer: resolves a sticker set and downloads every member.
//!
//! Layout produced under the output root:
//!
//! ```text
//! <output_root>/<set name>/originalFiles/sticker_<n>_<emoji>.<ext>
//! ```
//!
//! Membership is resolved with a single call to the source. Downloads fan out
//! through a [`WorkPool`]; per-item failures are recorded in the report and
//! never abort the rest of the set. Items whose file already exists are
//! skipped, so rerunning after a crash converges.

mod naming;

pub use naming::{sanitize_association_key, sticker_file_name};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::fetcher::{FetchOutcome, UnitFetcher};
use crate::pool::{PoolError, UnitResult, WorkPool};
use crate::source::{CollectionDescriptor, SourceError, StickerSource};

/// Directory under the set directory that holds downloaded originals.
pub const ORIGINALS_DIR: &str = "originalFiles";

/// A progress checkpoint is emitted every this many completed items.
pub const PROGRESS_INTERVAL: usize = 5;

/// Errors that abort an acquisition before any item is fetched.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The set could not be resolved.
    #[error("Failed to resolve sticker set '{name}': {source}")]
    Resolve {
        name: String,
        #[source]
        source: SourceError,
    },

    /// The output directory could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid concurrency setting.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Progress checkpoint of an acquisition.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AcquireProgress {
    pub collection: String,
    /// Items finished so far, whatever their outcome.
    pub processed: usize,
    /// Items newly downloaded so far.
    pub downloaded: usize,
    pub total: usize,
}

impl AcquireProgress {
    pub fn processed_fraction(&self) -> f32 {
        fraction(self.processed, self.total)
    }

    pub fn downloaded_fraction(&self) -> f32 {
        fraction(self.downloaded, self.total)
    }
}

fn fraction(part: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        part as f32 / total as f32
    }
}

/// Result of one acquisition run.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionReport {
    pub collection: CollectionDescriptor,
    /// `<output_root>/<set name>`.
    pub collection_dir: PathBuf,
    /// Directory holding the downloaded originals.
    pub files_dir: PathBuf,
    /// Destination path of each item, index-aligned with `outcomes`.
    pub destinations: Vec<PathBuf>,
    /// Outcome of each item, in set order.
    pub outcomes: Vec<FetchOutcome>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AcquisitionReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn downloaded_count(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Downloaded { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Skipped))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Failed { .. }))
    }

    pub fn cancelled_count(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Cancelled))
    }

    /// Items that ended up on disk, fresh or from an earlier run.
    pub fn present_count(&self) -> usize {
        self.downloaded_count() + self.skipped_count()
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                FetchOutcome::Downloaded { bytes } => *bytes,
                _ => 0,
            })
            .sum()
    }

    /// True when every item is present on disk.
    pub fn all_succeeded(&self) -> bool {
        self.present_count() == self.total()
    }

    fn count(&self, pred: impl Fn(&FetchOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

struct ProgressCounter {
    collection: String,
    total: usize,
    processed: AtomicUsize,
    downloaded: AtomicUsize,
    progress_tx: Option<mpsc::Sender<AcquireProgress>>,
}

impl ProgressCounter {
    fn record(&self, outcome: &FetchOutcome) {
        if matches!(outcome, FetchOutcome::Downloaded { .. }) {
            self.downloaded.fetch_add(1, Ordering::SeqCst);
        }
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        // The final checkpoint is emitted once all workers have joined.
        if processed % PROGRESS_INTERVAL == 0 && processed < self.total {
            self.emit(processed);
        }
    }

    fn emit_final(&self) {
        self.emit(self.processed.load(Ordering::SeqCst));
    }

    fn emit(&self, processed: usize) {
        let progress = AcquireProgress {
            collection: self.collection.clone(),
            processed,
            downloaded: self.downloaded.load(Ordering::SeqCst).min(processed),
            total: self.total,
        };
        info!(
            collection = %progress.collection,
            processed = progress.processed,
            total = progress.total,
            "Processed {:.0}% of stickers, {:.0}% newly downloaded",
            progress.processed_fraction() * 100.0,
            progress.downloaded_fraction() * 100.0
        );
        if let Some(ref tx) = self.progress_tx {
            // Non-blocking send
            let _ = tx.try_send(progress);
        }
    }
}

/// Resolves sticker sets and downloads their members.
#[derive(Clone)]
pub struct SetAcquirer {
    source: Arc<dyn StickerSource>,
    fetcher: UnitFetcher,
}

impl SetAcquirer {
    pub fn new(source: Arc<dyn StickerSource>) -> Self {
        let fetcher = UnitFetcher::new(Arc::clone(&source));
        Self { source, fetcher }
    }

    /// Checks that the source is reachable and authorized.
    pub async fn validate_source(&self) -> Result<(), SourceError> {
        self.source.validate().await
    }

    /// Acquires `collection_id` into `output_root` using `concurrency` workers.
    pub async fn acquire(
        &self,
        collection_id: &str,
        output_root: &Path,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionReport, AcquireError> {
        self.acquire_with_progress(collection_id, output_root, concurrency, cancel, None)
            .await
    }

    /// Acquires a set, sending progress checkpoints to `progress_tx`.
    ///
    /// A full or closed channel never blocks or fails the acquisition.
    pub async fn acquire_with_progress(
        &self,
        collection_id: &str,
        output_root: &Path,
        concurrency: usize,
        cancel: &CancellationToken,
        progress_tx: Option<mpsc::Sender<AcquireProgress>>,
    ) -> Result<AcquisitionReport, AcquireError> {
        let pool = WorkPool::new("fetch", concurrency)?;
        let started_at = Utc::now();
        let start = Instant::now();

        let collection = self
            .source
            .resolve_collection(collection_id)
            .await
            .map_err(|source| AcquireError::Resolve {
                name: collection_id.to_string(),
                source,
            })?;

        let collection_dir = output_root.join(&collection.name);
        let files_dir = collection_dir.join(ORIGINALS_DIR);
        tokio::fs::create_dir_all(&files_dir)
            .await
            .map_err(|source| AcquireError::OutputDirectory {
                path: files_dir.clone(),
                source,
            })?;

        info!(
            collection = %collection.name,
            title = %collection.title,
            stickers = collection.len(),
            source = self.source.name(),
            "Starting to download sticker set to {}",
            files_dir.display()
        );

        let destinations: Vec<PathBuf> = collection
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| files_dir.join(sticker_file_name(i + 1, item)))
            .collect();

        let counter = Arc::new(ProgressCounter {
            collection: collection.name.clone(),
            total: collection.len(),
            processed: AtomicUsize::new(0),
            downloaded: AtomicUsize::new(0),
            progress_tx,
        });

        let units = collection
            .items
            .iter()
            .cloned()
            .zip(destinations.iter().cloned())
            .map(|(item, destination)| {
                let fetcher = self.fetcher.clone();
                let counter = Arc::clone(&counter);
                move |token: CancellationToken| async move {
                    let outcome = fetcher.fetch(&item, &destination, &token).await;
                    counter.record(&outcome);
                    outcome
                }
            });

        let results = pool.run(units, cancel).await;
        counter.emit_final();

        let outcomes: Vec<FetchOutcome> = results
            .into_iter()
            .map(|result| match result {
                UnitResult::Completed(outcome) => outcome,
                UnitResult::Cancelled => FetchOutcome::Cancelled,
                UnitResult::Panicked(error) => FetchOutcome::Failed { error },
            })
            .collect();

        for (index, outcome) in outcomes.iter().enumerate() {
            if let FetchOutcome::Failed { error } = outcome {
                warn!(
                    collection = %collection.name,
                    index = index + 1,
                    "Sticker download failed: {}",
                    error
                );
            }
        }

        let report = AcquisitionReport {
            collection,
            collection_dir,
            files_dir,
            destinations,
            outcomes,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            collection = %report.collection.name,
            downloaded = report.downloaded_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            cancelled = report.cancelled_count(),
            "Downloaded {} stickers in {:.3}s",
            report.downloaded_count(),
            report.duration_ms as f64 / 1000.0
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockStickerSource};
    use tempfile::TempDir;

    #[test]
    fn test_progress_fractions() {
        let progress = AcquireProgress {
            collection: "foo".to_string(),
            processed: 5,
            downloaded: 2,
            total: 10,
        };
        assert_eq!(progress.processed_fraction(), 0.5);
        assert_eq!(progress.downloaded_fraction(), 0.2);
    }

    #[test]
    fn test_empty_set_fraction_is_complete() {
        assert_eq!(fraction(0, 0), 1.0);
    }

    #[tokio::test]
    async fn test_progress_checkpoints() {
        let dir = TempDir::new().unwrap();
        let source = MockStickerSource::new();
        source.add_collection(fixtures::collection("bar", 12)).await;

        let acquirer = SetAcquirer::new(Arc::new(source));
        let (tx, mut rx) = mpsc::channel(32);
        let report = acquirer
            .acquire_with_progress("bar", dir.path(), 3, &CancellationToken::new(), Some(tx))
            .await
            .unwrap();
        assert_eq!(report.downloaded_count(), 12);

        let mut checkpoints = Vec::new();
        while let Ok(p) = rx.try_recv() {
            checkpoints.push(p.processed);
        }
        assert_eq!(checkpoints, vec![5, 10, 12]);
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block() {
        let dir = TempDir::new().unwrap();
        let source = MockStickerSource::new();
        source.add_collection(fixtures::collection("bar", 20)).await;

        let acquirer = SetAcquirer::new(Arc::new(source));
        let (tx, _rx) = mpsc::channel(1);
        let report = acquirer
            .acquire_with_progress("bar", dir.path(), 4, &CancellationToken::new(), Some(tx))
            .await
            .unwrap();
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn test_resolution_failure_aborts_before_fetching() {
        let dir = TempDir::new().unwrap();
        let source = MockStickerSource::new();
        let acquirer = SetAcquirer::new(Arc::new(source.clone()));

        let result = acquirer
            .acquire("missing", dir.path(), 2, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AcquireError::Resolve { .. })));
        assert_eq!(source.open_count(), 0);
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let dir = TempDir::new().unwrap();
        let source = MockStickerSource::new();
        source.add_collection(fixtures::collection("bar", 2)).await;
        let acquirer = SetAcquirer::new(Arc::new(source.clone()));

        let result = acquirer
            .acquire("bar", dir.path(), 0, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AcquireError::Pool(_))));
        assert_eq!(source.resolve_count(), 0);
    }
}
