//! Mock command runner for testing.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::converter::{CommandOutput, CommandRunner, ConverterError};

/// Bytes written to the output path of a successful invocation.
pub const MOCK_GIF_BYTES: &[u8] = b"GIF89a\x01\x00\x01\x00";

/// A scripted failure for inputs whose path contains `pattern`.
#[derive(Debug, Clone)]
struct FailureRule {
    pattern: String,
    exit_code: i32,
    stderr: String,
}

/// Mock implementation of the CommandRunner trait.
///
/// Never spawns a process. Each invocation is recorded; successful ones write
/// a tiny GIF to the last argument (the output path), the way ffmpeg would.
///
/// # Example
///
/// ```rust,ignore
/// use stickerpipe_core::testing::MockCommandRunner;
///
/// let runner = MockCommandRunner::new().with_delay(Duration::from_millis(20));
/// runner.fail_when_input_contains("broken", 1, "Invalid data").await;
///
/// // Use with GifTranscoder::new(Arc::new(runner.clone()), ...)
/// assert_eq!(runner.invocation_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockCommandRunner {
    invocations: Arc<RwLock<Vec<Vec<String>>>>,
    invocation_count: Arc<AtomicUsize>,
    failures: Arc<RwLock<Vec<FailureRule>>>,
    delay: Duration,
    create_outputs: bool,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MockCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommandRunner {
    /// Create a new mock runner where every command succeeds.
    pub fn new() -> Self {
        Self {
            invocations: Arc::new(RwLock::new(Vec::new())),
            invocation_count: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(RwLock::new(Vec::new())),
            delay: Duration::ZERO,
            create_outputs: true,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every invocation take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report success without writing any output file.
    pub fn without_outputs(mut self) -> Self {
        self.create_outputs = false;
        self
    }

    /// Exit with `exit_code` and `stderr` for inputs containing `pattern`.
    pub async fn fail_when_input_contains(&self, pattern: &str, exit_code: i32, stderr: &str) {
        self.failures.write().await.push(FailureRule {
            pattern: pattern.to_string(),
            exit_code,
            stderr: stderr.to_string(),
        });
    }

    /// Number of times `run` was called.
    pub fn invocation_count(&self) -> usize {
        self.invocation_count.load(Ordering::SeqCst)
    }

    /// Arguments of every invocation, in call order.
    pub async fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.read().await.clone()
    }

    /// Highest number of invocations observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn execute(
        &self,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ConverterError> {
        if cancel.is_cancelled() {
            return Err(ConverterError::Cancelled);
        }
        if !self.delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConverterError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default();

        let rule = self
            .failures
            .read()
            .await
            .iter()
            .find(|r| input.contains(&r.pattern))
            .cloned();
        if let Some(rule) = rule {
            return Ok(CommandOutput {
                exit_code: Some(rule.exit_code),
                stdout: String::new(),
                stderr: rule.stderr,
            });
        }

        if self.create_outputs {
            if let Some(output) = args.last() {
                tokio::fs::write(output, MOCK_GIF_BYTES).await?;
            }
        }

        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &self,
        _program: &Path,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ConverterError> {
        self.invocation_count.fetch_add(1, Ordering::SeqCst);
        self.invocations.write().await.push(args.to_vec());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = self.execute(args, cancel).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        result
    }
}
