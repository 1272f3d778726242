//! Pipeline lifecycle integration tests.
//!
//! These tests run the full download, convert and archive flow against the
//! mock source and the mock encoder. They verify:
//! - Directory layout and naming of every stage
//! - Rerun idempotence of the download and conversion stages
//! - Per-sticker failures flowing through to the final report
//! - Size-bounded archives covering every GIF

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use stickerpipe_core::{
    acquirer::ORIGINALS_DIR,
    converter::{GifTranscoder, GIFS_DIR},
    pipeline::ARCHIVES_DIR,
    testing::{fixtures, MockCommandRunner, MockStickerSource, MOCK_GIF_BYTES},
    FetchOutcome, PipelineRequest, PipelineSettings, StickerPipeline, TranscodeOrchestrator,
    TranscodeOutcome,
};

/// Test helper bundling a pipeline with its mocks.
struct TestHarness {
    source: MockStickerSource,
    runner: MockCommandRunner,
    pipeline: StickerPipeline,
    output_root: TempDir,
}

impl TestHarness {
    async fn new(archive_size_limit: u64) -> Self {
        let source = MockStickerSource::new();
        source.add_collection(fixtures::scenario_collection()).await;
        let runner = MockCommandRunner::new();
        let output_root = TempDir::new().expect("Failed to create temp dir");

        let transcoder = GifTranscoder::new(
            Arc::new(runner.clone()),
            "ffmpeg".into(),
            24,
            512,
        );
        let settings = PipelineSettings {
            output_root: output_root.path().to_path_buf(),
            download_concurrency: 2,
            convert_concurrency: 2,
            archive_size_limit,
        };
        let pipeline = StickerPipeline::new(
            Arc::new(source.clone()),
            TranscodeOrchestrator::new(transcoder),
            settings,
        );

        Self {
            source,
            runner,
            pipeline,
            output_root,
        }
    }

    fn set_dir(&self, name: &str) -> std::path::PathBuf {
        self.output_root.path().join(name)
    }
}

fn file_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_full_run_layout() {
    let harness = TestHarness::new(stickerpipe_core::DEFAULT_SIZE_LIMIT).await;

    let report = harness
        .pipeline
        .run(
            &PipelineRequest::new("foo").with_archive(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert!(!report.cancelled);

    let set_dir = harness.set_dir("foo");
    assert_eq!(
        file_names(&set_dir.join(ORIGINALS_DIR)),
        BTreeSet::from([
            "sticker_1_😀.webp".to_string(),
            "sticker_2_😀.webp".to_string(),
            "sticker_3_🎉.tgs".to_string(),
        ])
    );
    assert_eq!(
        file_names(&set_dir.join(GIFS_DIR)),
        BTreeSet::from([
            "sticker_1_😀.gif".to_string(),
            "sticker_2_😀.gif".to_string(),
            "sticker_3_🎉.gif".to_string(),
        ])
    );

    let manifest = report.archives.expect("archives requested");
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.total_entries(), 3);
    assert_eq!(
        manifest.archives[0].path,
        set_dir
            .join(ARCHIVES_DIR)
            .canonicalize()
            .unwrap()
            .join("foo_001.zip")
    );
    assert_eq!(
        manifest.total_uncompressed_bytes(),
        3 * MOCK_GIF_BYTES.len() as u64
    );
}

#[tokio::test]
async fn test_rerun_skips_everything() {
    let harness = TestHarness::new(stickerpipe_core::DEFAULT_SIZE_LIMIT).await;
    let request = PipelineRequest::new("foo");
    let cancel = CancellationToken::new();

    harness.pipeline.run(&request, &cancel).await.unwrap();
    let opens = harness.source.open_count();
    let encodes = harness.runner.invocation_count();
    assert_eq!((opens, encodes), (3, 3));

    let second = harness.pipeline.run(&request, &cancel).await.unwrap();

    assert_eq!(harness.source.open_count(), opens);
    assert_eq!(harness.runner.invocation_count(), encodes);
    assert_eq!(second.acquisition.skipped_count(), 3);
    let transcode = second.transcode.unwrap();
    assert_eq!(transcode.skipped_count(), 3);
    assert!(transcode.all_succeeded());
}

#[tokio::test]
async fn test_failures_are_reported_not_fatal() {
    let harness = TestHarness::new(stickerpipe_core::DEFAULT_SIZE_LIMIT).await;
    harness.source.fail_on_open("2").await;
    harness
        .runner
        .fail_when_input_contains("sticker_3", 1, "Invalid data found when processing input")
        .await;

    let report = harness
        .pipeline
        .run(
            &PipelineRequest::new("foo").with_archive(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.all_succeeded());
    assert!(matches!(
        report.acquisition.outcomes[1],
        FetchOutcome::Failed { .. }
    ));

    // Only the two downloaded originals reach the encoder.
    let transcode = report.transcode.unwrap();
    assert_eq!(transcode.total(), 2);
    assert_eq!(transcode.converted_count(), 1);
    assert_eq!(
        transcode.outcomes[1],
        TranscodeOutcome::Failed {
            exit_code: Some(1),
            stderr: "Invalid data found when processing input".to_string(),
        }
    );

    let manifest = report.archives.unwrap();
    assert_eq!(manifest.total_entries(), 1);
    assert_eq!(manifest.archives[0].entries, vec!["sticker_1_😀.gif"]);
}

#[tokio::test]
async fn test_small_limit_splits_archives() {
    let limit = 2 * MOCK_GIF_BYTES.len() as u64;
    let harness = TestHarness::new(limit).await;
    harness
        .source
        .add_collection(fixtures::collection("many", 7))
        .await;

    let report = harness
        .pipeline
        .run(
            &PipelineRequest::new("many").with_archive(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let manifest = report.archives.unwrap();
    assert_eq!(manifest.len(), 4);
    assert_eq!(manifest.total_entries(), 7);
    for (i, archive) in manifest.archives.iter().enumerate() {
        assert!(archive.uncompressed_bytes <= limit);
        assert_eq!(
            archive.path.file_name().unwrap().to_string_lossy(),
            format!("many_{:03}.zip", i + 1)
        );
        assert!(archive.path.exists());
    }
}

#[tokio::test]
async fn test_unknown_set_fails_before_any_stage_output() {
    let harness = TestHarness::new(stickerpipe_core::DEFAULT_SIZE_LIMIT).await;

    let result = harness
        .pipeline
        .run(&PipelineRequest::new("nope"), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert!(!harness.set_dir("nope").exists());
    assert_eq!(harness.runner.invocation_count(), 0);
}
