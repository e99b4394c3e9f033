//! Scripted analysis runners
//!
//! Stand-ins for the external executable so lifecycle tests control exactly
//! what the runner returns and when.

use async_trait::async_trait;
use eeg_pipeline::services::{AnalysisRunner, RunOutput, RunnerError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Exit { stderr: String },
}

/// Runner returning a fixed reply, optionally after a delay
#[derive(Debug, Clone)]
pub struct ScriptedRunner {
    reply: Reply,
    delay: Duration,
    model_version: String,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedRunner {
    /// Exit 0 with `stdout`
    pub fn ok(stdout: &str) -> Self {
        Self {
            reply: Reply::Stdout(stdout.to_string()),
            delay: Duration::ZERO,
            model_version: "test-model".to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Non-zero exit with `stderr`
    pub fn failing(stderr: &str) -> Self {
        Self {
            reply: Reply::Exit {
                stderr: stderr.to_string(),
            },
            ..Self::ok("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_model_version(mut self, model_version: &str) -> Self {
        self.model_version = model_version.to_string();
        self
    }

    /// Paths the runner was invoked with
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisRunner for ScriptedRunner {
    async fn run(&self, file_path: &Path) -> Result<RunOutput, RunnerError> {
        self.calls.lock().unwrap().push(file_path.to_path_buf());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.reply {
            Reply::Stdout(stdout) => Ok(RunOutput {
                stdout: stdout.clone().into_bytes(),
                stderr: Vec::new(),
                elapsed: self.delay,
            }),
            Reply::Exit { stderr } => Err(RunnerError::NonZeroExit {
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            }),
        }
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

/// Runner that blocks until released, for racing cancel/delete against execution
#[derive(Debug, Clone)]
pub struct GatedRunner {
    stdout: String,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl GatedRunner {
    pub fn new(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    /// Resolves once the runner has been invoked
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let the blocked run return its output
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl AnalysisRunner for GatedRunner {
    async fn run(&self, _file_path: &Path) -> Result<RunOutput, RunnerError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(RunOutput {
            stdout: self.stdout.clone().into_bytes(),
            stderr: Vec::new(),
            elapsed: Duration::from_millis(1),
        })
    }

    fn model_version(&self) -> &str {
        "gated-model"
    }
}
