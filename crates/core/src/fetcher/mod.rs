//! Unit fetcher: downloads one sticker to a local path.
//!
//! An existing file at the destination is trusted and skipped without
//! touching the network. New downloads are streamed into a `.part` sibling
//! and renamed into place only once complete, so a crash never leaves a
//! truncated file that a later skip check would accept.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::source::{MediaItem, SourceError, StickerSource};

/// Result of fetching one item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The destination already existed.
    Skipped,
    /// The item was downloaded.
    Downloaded { bytes: u64 },
    /// The download failed.
    Failed { error: String },
    /// The run was cancelled before or during the download.
    Cancelled,
}

impl FetchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Error)]
enum FetchError {
    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Downloads single items from a [`StickerSource`].
#[derive(Clone)]
pub struct UnitFetcher {
    source: Arc<dyn StickerSource>,
}

impl UnitFetcher {
    pub fn new(source: Arc<dyn StickerSource>) -> Self {
        Self { source }
    }

    /// Fetches `item` into `destination`. Never returns an error; failures are
    /// reported as [`FetchOutcome::Failed`].
    pub async fn fetch(
        &self,
        item: &MediaItem,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        match self.try_fetch(item, destination, cancel).await {
            Ok(outcome) => outcome,
            Err(FetchError::Cancelled) => FetchOutcome::Cancelled,
            Err(e) => {
                debug!(
                    "Fetch of {} into {} failed: {}",
                    item.remote_id,
                    destination.display(),
                    e
                );
                FetchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn try_fetch(
        &self,
        item: &MediaItem,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        if fs::try_exists(destination).await? {
            return Ok(FetchOutcome::Skipped);
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(destination);
        let written = match self.stream_to(item, &partial, cancel).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&partial, destination).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        Ok(FetchOutcome::Downloaded { bytes: written })
    }

    async fn stream_to(
        &self,
        item: &MediaItem,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            stream = self.source.open_item(item) => stream?,
        };

        let mut file = File::create(path).await?;
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

/// Temporary download path next to `destination`.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
