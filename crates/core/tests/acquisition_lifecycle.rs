//! Acquisition lifecycle integration tests.
//!
//! These tests drive the set acquirer against the mock sticker source:
//! - Skip-if-exists idempotence across reruns
//! - Destination naming for the "foo" set
//! - Isolation of single download failures
//! - Concurrency limits and order of the outcome list

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use stickerpipe_core::{
    acquirer::ORIGINALS_DIR,
    testing::{fixtures, MockStickerSource},
    FetchOutcome, SetAcquirer,
};

/// Test helper bundling a mock source, an acquirer and an output root.
struct TestHarness {
    source: MockStickerSource,
    acquirer: SetAcquirer,
    output_root: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        let source = MockStickerSource::new();
        source.add_collection(fixtures::scenario_collection()).await;
        let acquirer = SetAcquirer::new(Arc::new(source.clone()));
        let output_root = TempDir::new().expect("Failed to create temp dir");
        Self {
            source,
            acquirer,
            output_root,
        }
    }

    async fn acquire(&self, name: &str, concurrency: usize) -> stickerpipe_core::AcquisitionReport {
        self.acquirer
            .acquire(
                name,
                self.output_root.path(),
                concurrency,
                &CancellationToken::new(),
            )
            .await
            .expect("acquisition should succeed")
    }
}

#[tokio::test]
async fn test_scenario_naming_and_rerun_after_delete() {
    let harness = TestHarness::new().await;

    let first = harness.acquire("foo", 2).await;
    let files_dir = harness.output_root.path().join("foo").join(ORIGINALS_DIR);
    assert_eq!(first.files_dir, files_dir);
    assert_eq!(
        first.destinations,
        vec![
            files_dir.join("sticker_1_😀.webp"),
            files_dir.join("sticker_2_😀.webp"),
            files_dir.join("sticker_3_🎉.tgs"),
        ]
    );
    assert_eq!(first.downloaded_count(), 3);

    std::fs::remove_file(files_dir.join("sticker_2_😀.webp")).unwrap();
    let second = harness.acquire("foo", 2).await;

    assert!(matches!(
        second.outcomes.as_slice(),
        [
            FetchOutcome::Skipped,
            FetchOutcome::Downloaded { .. },
            FetchOutcome::Skipped
        ]
    ));
    assert_eq!(harness.source.open_count(), 4);
}

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let harness = TestHarness::new().await;
    harness
        .source
        .add_collection(fixtures::collection("big", 23))
        .await;

    let first = harness.acquire("big", 4).await;
    let opens_after_first = harness.source.open_count();
    let second = harness.acquire("big", 4).await;

    assert_eq!(first.downloaded_count(), 23);
    assert_eq!(second.downloaded_count(), 0);
    assert_eq!(second.skipped_count(), first.downloaded_count());
    assert_eq!(harness.source.open_count(), opens_after_first);
    assert_eq!(harness.source.resolve_count(), 2);
}

#[tokio::test]
async fn test_single_failure_is_isolated() {
    let harness = TestHarness::new().await;
    harness
        .source
        .add_collection(fixtures::collection("mixed", 8))
        .await;
    harness.source.fail_mid_stream("mixed-5").await;

    let report = harness.acquire("mixed", 3).await;

    assert_eq!(report.total(), 8);
    assert_eq!(report.downloaded_count(), 7);
    assert_eq!(report.failed_count(), 1);
    assert!(report.outcomes[4].is_failure());
    assert!(!report.all_succeeded());
    assert!(!report.destinations[4].exists());

    // A rerun after the source recovers only fetches the missing item.
    harness.source.clear_failures().await;
    let rerun = harness.acquire("mixed", 3).await;
    assert_eq!(rerun.downloaded_count(), 1);
    assert_eq!(rerun.skipped_count(), 7);
    assert!(rerun.all_succeeded());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bound() {
    for limit in [1, 4, 16] {
        let harness = TestHarness::new().await;
        harness
            .source
            .add_collection(fixtures::collection("wide", 40))
            .await;
        harness
            .source
            .set_stream_delay(Duration::from_millis(10))
            .await;

        let report = harness.acquire("wide", limit).await;

        assert_eq!(report.downloaded_count(), 40);
        assert!(
            harness.source.peak_streams() <= limit,
            "limit {} exceeded: {}",
            limit,
            harness.source.peak_streams()
        );
    }
}

#[tokio::test]
async fn test_outcomes_follow_set_order() {
    let harness = TestHarness::new().await;
    harness
        .source
        .add_collection(fixtures::collection("order", 6))
        .await;
    harness.source.slow_down("order-1", Duration::from_millis(80)).await;
    harness.source.fail_on_open("order-4").await;

    let report = harness.acquire("order", 6).await;

    assert_eq!(report.outcomes.len(), 6);
    for (i, outcome) in report.outcomes.iter().enumerate() {
        if i == 3 {
            assert!(outcome.is_failure());
        } else {
            let expected = fixtures::payload(&format!("order-{}", i + 1)).len() as u64;
            assert_eq!(outcome, &FetchOutcome::Downloaded { bytes: expected });
            assert_eq!(
                std::fs::read(&report.destinations[i]).unwrap(),
                fixtures::payload(&format!("order-{}", i + 1))
            );
        }
    }
}

#[tokio::test]
async fn test_cancellation_marks_pending_items() {
    let harness = TestHarness::new().await;
    harness
        .source
        .add_collection(fixtures::collection("slow", 10))
        .await;
    harness
        .source
        .set_stream_delay(Duration::from_millis(200))
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = harness
        .acquirer
        .acquire("slow", harness.output_root.path(), 2, &cancel)
        .await
        .unwrap();

    assert_eq!(report.total(), 10);
    assert_eq!(report.cancelled_count(), 10);
    for destination in &report.destinations {
        assert!(!destination.exists());
    }
}
