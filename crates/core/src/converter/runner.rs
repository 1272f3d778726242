//! External command execution.
//!
//! [`CommandRunner`] runs a program to completion and hands back its exit
//! status and captured output. The transcoder only talks to this trait, so
//! tests can swap in a scripted runner instead of spawning ffmpeg.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::ConverterError;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs `program` with `args` and waits for it to exit.
    ///
    /// When `cancel` fires the child is killed and
    /// [`ConverterError::Cancelled`] is returned.
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ConverterError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(
        &self,
        program: &Path,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ConverterError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfmpegNotFound {
                        path: program.to_path_buf(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        // Both pipes are drained to EOF before waiting, so a chatty child can
        // never block on a full pipe.
        let finished = async move {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (out_read, err_read) = tokio::join!(
                async {
                    match stdout.as_mut() {
                        Some(pipe) => pipe.read_to_end(&mut out).await.map(|_| ()),
                        None => Ok(()),
                    }
                },
                async {
                    match stderr.as_mut() {
                        Some(pipe) => pipe.read_to_end(&mut err).await.map(|_| ()),
                        None => Ok(()),
                    }
                },
            );
            out_read?;
            err_read?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Dropping `finished` drops the child, which kills it.
                debug!("Killing {} after cancellation", program.display());
                Err(ConverterError::Cancelled)
            }
            result = finished => {
                let (status, out, err) = result?;
                Ok(CommandOutput {
                    exit_code: status.code(),
                    stdout: String::from_utf8_lossy(&out).into_owned(),
                    stderr: String::from_utf8_lossy(&err).into_owned(),
                })
            }
        }
    }
}
