//! Mock sticker source for testing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::source::{CollectionDescriptor, ItemStream, MediaItem, SourceError, StickerSource};

use super::fixtures;

/// How a forced failure shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    /// `open_item` returns an error.
    OnOpen,
    /// The stream yields half the payload, then an error.
    MidStream,
}

/// Decrements the active stream counter when a stream is dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock implementation of the StickerSource trait.
///
/// Provides controllable behavior for testing:
/// - Serve registered sets and per-item payloads from memory
/// - Force open or mid-stream failures for chosen items
/// - Slow streams down to observe concurrency
/// - Count resolve and open calls
///
/// Items without an explicit payload are served [`fixtures::payload`].
#[derive(Debug, Clone)]
pub struct MockStickerSource {
    collections: Arc<RwLock<HashMap<String, CollectionDescriptor>>>,
    payloads: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failures: Arc<RwLock<HashMap<String, FailureMode>>>,
    slow_items: Arc<RwLock<HashSet<String>>>,
    stream_delay: Arc<RwLock<Duration>>,
    resolve_count: Arc<AtomicUsize>,
    open_count: Arc<AtomicUsize>,
    active_streams: Arc<AtomicUsize>,
    peak_streams: Arc<AtomicUsize>,
    rejected: Arc<AtomicBool>,
}

impl Default for MockStickerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStickerSource {
    /// Create a new empty mock source.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            payloads: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            slow_items: Arc::new(RwLock::new(HashSet::new())),
            stream_delay: Arc::new(RwLock::new(Duration::ZERO)),
            resolve_count: Arc::new(AtomicUsize::new(0)),
            open_count: Arc::new(AtomicUsize::new(0)),
            active_streams: Arc::new(AtomicUsize::new(0)),
            peak_streams: Arc::new(AtomicUsize::new(0)),
            rejected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a set; it resolves under its lower-cased name.
    pub async fn add_collection(&self, collection: CollectionDescriptor) {
        self.collections
            .write()
            .await
            .insert(collection.name.to_lowercase(), collection);
    }

    /// Set the bytes served for `remote_id`.
    pub async fn set_payload(&self, remote_id: &str, payload: Vec<u8>) {
        self.payloads
            .write()
            .await
            .insert(remote_id.to_string(), payload);
    }

    /// Make `open_item` fail for `remote_id`.
    pub async fn fail_on_open(&self, remote_id: &str) {
        self.failures
            .write()
            .await
            .insert(remote_id.to_string(), FailureMode::OnOpen);
    }

    /// Make the stream of `remote_id` break after half the payload.
    pub async fn fail_mid_stream(&self, remote_id: &str) {
        self.failures
            .write()
            .await
            .insert(remote_id.to_string(), FailureMode::MidStream);
    }

    /// Remove all forced failures.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Delay every stream by `delay` before its first chunk.
    pub async fn set_stream_delay(&self, delay: Duration) {
        *self.stream_delay.write().await = delay;
    }

    /// Delay only the stream of `remote_id`.
    pub async fn slow_down(&self, remote_id: &str, delay: Duration) {
        self.slow_items.write().await.insert(remote_id.to_string());
        *self.stream_delay.write().await = delay;
    }

    /// Make `validate` fail as if the credentials were revoked.
    pub fn reject_credentials(&self) {
        self.rejected.store(true, Ordering::SeqCst);
    }

    /// Number of `resolve_collection` calls.
    pub fn resolve_count(&self) -> usize {
        self.resolve_count.load(Ordering::SeqCst)
    }

    /// Number of `open_item` calls.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Highest number of streams observed open at once.
    pub fn peak_streams(&self) -> usize {
        self.peak_streams.load(Ordering::SeqCst)
    }

    async fn delay_for(&self, remote_id: &str) -> Duration {
        let delay = *self.stream_delay.read().await;
        let slow = self.slow_items.read().await;
        if slow.is_empty() || slow.contains(remote_id) {
            delay
        } else {
            Duration::ZERO
        }
    }
}

#[async_trait]
impl StickerSource for MockStickerSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve_collection(&self, name: &str) -> Result<CollectionDescriptor, SourceError> {
        self.resolve_count.fetch_add(1, Ordering::SeqCst);
        self.collections
            .read()
            .await
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("sticker set '{}'", name)))
    }

    async fn validate(&self) -> Result<(), SourceError> {
        if self.rejected.load(Ordering::SeqCst) {
            return Err(SourceError::api(401, "Unauthorized"));
        }
        Ok(())
    }

    async fn open_item(&self, item: &MediaItem) -> Result<ItemStream, SourceError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let failure = self.failures.read().await.get(&item.remote_id).copied();
        if failure == Some(FailureMode::OnOpen) {
            return Err(SourceError::NotFound(format!("file '{}'", item.remote_id)));
        }

        let payload = self
            .payloads
            .read()
            .await
            .get(&item.remote_id)
            .cloned()
            .unwrap_or_else(|| fixtures::payload(&item.remote_id));
        let delay = self.delay_for(&item.remote_id).await;

        let now = self.active_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_streams.fetch_max(now, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active_streams));

        let mid = payload.len() / 2;
        let chunks: Vec<Result<Bytes, SourceError>> = match failure {
            Some(FailureMode::MidStream) => vec![
                Ok(Bytes::copy_from_slice(&payload[..mid])),
                Err(SourceError::api(502, "connection reset by peer")),
            ],
            _ => vec![
                Ok(Bytes::copy_from_slice(&payload[..mid])),
                Ok(Bytes::copy_from_slice(&payload[mid..])),
            ],
        };

        let head = stream::once(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        })
        .filter_map(|_| async { None::<Result<Bytes, SourceError>> });

        // The guard lives as long as the stream.
        let body = stream::iter(chunks).map(move |chunk| {
            let _held = &guard;
            chunk
        });

        Ok(head.chain(body).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FormatTag;

    #[tokio::test]
    async fn test_resolve_is_case_insensitive() {
        let source = MockStickerSource::new();
        source.add_collection(fixtures::collection("foo", 2)).await;

        let collection = source.resolve_collection("FOO").await.unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(source.resolve_count(), 1);
        assert!(source.resolve_collection("bar").await.is_err());
    }

    #[tokio::test]
    async fn test_stream_serves_default_payload() {
        let source = MockStickerSource::new();
        let item = fixtures::media_item("abc", "😀", FormatTag::Static);

        let chunks: Vec<_> = source.open_item(&item).await.unwrap().collect().await;
        let body: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(body, fixtures::payload("abc"));
        assert_eq!(source.peak_streams(), 1);
    }
}
