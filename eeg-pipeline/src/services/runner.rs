//! External analysis runner
//!
//! Invokes a configured executable with the job's file path as its final
//! argument and captures stdout/stderr in full. The executable is a black box;
//! only its exit status and output streams are interpreted.

use async_trait::async_trait;
use eeg_common::config::CommandConfig;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Runner failure; display text carries the diagnostic stream verbatim
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Executable could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited unsuccessfully
    #[error("{status}\nStderr: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    /// Deadline expired; the process was killed
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Waiting on the process failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Failure kind label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            RunnerError::Spawn { .. } => "spawn",
            RunnerError::NonZeroExit { .. } => "non_zero_exit",
            RunnerError::Timeout { .. } => "timeout",
            RunnerError::Io(_) => "io",
        }
    }
}

/// Captured output of a successful run
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Wall-clock time from spawn to exit
    pub elapsed: Duration,
}

/// Runs the analysis routine on one file
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    async fn run(&self, file_path: &Path) -> Result<RunOutput, RunnerError>;

    /// Tag stored on results produced by this runner
    fn model_version(&self) -> &str;
}

/// Runner backed by an external command
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    model_version: String,
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// `timeout_secs == 0` disables the deadline
    pub fn new(config: &CommandConfig, timeout_secs: u64) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            model_version: config.model_version.clone(),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }
}

#[async_trait]
impl AnalysisRunner for CommandRunner {
    async fn run(&self, file_path: &Path) -> Result<RunOutput, RunnerError> {
        debug!(
            program = %self.program,
            file_path = %file_path.display(),
            "Starting analysis runner"
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(file_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let start = Instant::now();

        // Dropping the wait future on expiry drops the child, which kills it
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RunnerError::Timeout {
                    secs: limit.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        let elapsed = start.elapsed();

        if !output.status.success() {
            return Err(RunnerError::NonZeroExit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            "Analysis runner finished"
        );

        Ok(RunOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            elapsed,
        })
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}
