//! Job lifecycle manager
//!
//! Owns jobs from submission to a terminal state:
//!
//! ```text
//! queued → processing → {completed | failed | cancelled}
//! ```
//!
//! `submit` and `start` return immediately; validation and execution run on
//! the [`TaskSpawner`]. Every terminal write is conditional on the job still
//! being in the status the writer expects, so a late runner result can never
//! overwrite a cancellation.
//!
//! Several processes may share one database. While a job executes, its
//! process refreshes a heartbeat on the job row; recovery only fails
//! processing jobs whose heartbeat has gone stale.

use chrono::{Duration as ChronoDuration, Utc};
use eeg_common::events::{EventBus, PipelineEvent};
use eeg_common::JobStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    AnalysisResult, AnalysisVariant, FileMetadata, Job, JobFilter, JobWithResult, Priority,
};
use crate::services::interpreter::{self, Interpretation, Outcome};
use crate::services::metadata_validator;
use crate::services::runner::{AnalysisRunner, RunOutput};
use crate::services::task_spawner::TaskSpawner;
use crate::store::JobStore;
use crate::utils::{confine_to_root, sanitize_base_name, storage_name};

/// Error message recorded on jobs found processing at startup
pub const INTERRUPTED_MESSAGE: &str = "Interrupted: pipeline restarted while job was processing";

/// Classification progress stops here until the runner finishes
const PROGRESS_CEILING: u8 = 90;
const PROGRESS_STEP: u8 = 10;
/// Prediction reports this before invoking its runner
const PREDICTION_PROGRESS: u8 = 50;

/// One runner per analysis variant
#[derive(Clone)]
pub struct Runners {
    pub classification: Arc<dyn AnalysisRunner>,
    pub prediction: Arc<dyn AnalysisRunner>,
}

impl Runners {
    fn for_variant(&self, variant: AnalysisVariant) -> &Arc<dyn AnalysisRunner> {
        match variant {
            AnalysisVariant::Classification => &self.classification,
            AnalysisVariant::Prediction => &self.prediction,
        }
    }
}

/// Tunables for execution and validation
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Classification progress tick period
    pub progress_interval: Duration,
    /// Sampling rate assumed when computing recording duration
    pub sampling_rate_hz: u32,
    /// Heartbeat refresh period while a runner is active
    pub heartbeat_interval: Duration,
    /// Heartbeat age after which a processing job counts as abandoned
    pub stale_after: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(300),
            sampling_rate_hz: 256,
            heartbeat_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(60),
        }
    }
}

/// Submission request
#[derive(Debug, Clone)]
pub struct Submission {
    pub owner_id: i64,
    /// Declared upload name; reduced to a sanitized base name
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub subject_label: String,
    pub priority: Priority,
    pub variant: AnalysisVariant,
}

#[derive(Clone)]
pub struct JobManager {
    store: Arc<dyn JobStore>,
    runners: Runners,
    spawner: TaskSpawner,
    events: EventBus,
    upload_root: PathBuf,
    settings: ManagerSettings,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        runners: Runners,
        spawner: TaskSpawner,
        events: EventBus,
        upload_root: PathBuf,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            store,
            runners,
            spawner,
            events,
            upload_root,
            settings,
        }
    }

    /// Store the upload and create a queued job
    ///
    /// Duplicate (owner, subject label) pairs are rejected before anything is
    /// written, echoing the existing job id. Metadata validation is started
    /// in the background.
    pub async fn submit(&self, submission: Submission) -> PipelineResult<Job> {
        let subject_label = submission.subject_label.trim().to_string();
        if subject_label.is_empty() {
            return Err(PipelineError::InvalidInput(
                "Subject label is required".to_string(),
            ));
        }

        if let Some(existing_job_id) = self
            .store
            .find_job_by_subject(submission.owner_id, &subject_label)
            .await?
        {
            return Err(PipelineError::DuplicateSubject { existing_job_id });
        }

        let base = sanitize_base_name(&submission.file_name)?;
        let candidate = self.upload_root.join(storage_name(Utc::now(), &base));
        let stored_path = confine_to_root(&self.upload_root, &candidate)?;

        write_new_file(&stored_path, &submission.bytes).await?;

        let job = Job::new(
            submission.owner_id,
            subject_label,
            submission.file_name,
            stored_path.display().to_string(),
            submission.bytes.len() as i64,
            submission.variant,
            submission.priority,
        );

        if let Err(e) = self.store.insert_job(&job).await {
            remove_artifact(&stored_path).await;

            // Lost a race with a concurrent submission of the same label
            if e.is_unique_violation() {
                if let Some(existing_job_id) = self
                    .store
                    .find_job_by_subject(job.owner_id, &job.subject_label)
                    .await?
                {
                    return Err(PipelineError::DuplicateSubject { existing_job_id });
                }
            }
            return Err(e.into());
        }

        info!(
            job_id = %job.id,
            owner_id = job.owner_id,
            subject_label = %job.subject_label,
            variant = %job.variant,
            bytes = job.file_size,
            "Job submitted"
        );

        self.spawner.spawn(
            "metadata_validation",
            metadata_validator::validate_and_record(
                self.store.clone(),
                self.events.clone(),
                job.id,
                stored_path,
                self.settings.sampling_rate_hz,
            ),
        );

        Ok(job)
    }

    /// queued → processing, then execute in the background
    pub async fn start(&self, job_id: Uuid) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;
        if job.status != JobStatus::Queued {
            return Err(PipelineError::InvalidState { status: job.status });
        }

        if !self.store.mark_processing(job_id, Utc::now()).await? {
            let current = self.require_job(job_id).await?;
            return Err(PipelineError::InvalidState {
                status: current.status,
            });
        }
        self.emit_status(job_id, JobStatus::Queued, JobStatus::Processing);

        let manager = self.clone();
        self.spawner.spawn("execute_job", async move {
            manager.execute(job_id).await;
        });

        info!(job_id = %job_id, variant = %job.variant, "Job started");

        self.require_job(job_id).await
    }

    /// Run a processing job to a terminal state
    ///
    /// Normally reached through [`JobManager::start`]. Does nothing unless the
    /// job is processing.
    pub async fn execute(&self, job_id: Uuid) {
        let job = match self.store.get_job(job_id).await {
            Ok(Some(job)) if job.status == JobStatus::Processing => job,
            Ok(Some(job)) => {
                debug!(job_id = %job_id, status = %job.status, "Job not processing, skipping execution");
                return;
            }
            Ok(None) => {
                warn!(job_id = %job_id, "Job vanished before execution");
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to load job for execution");
                return;
            }
        };

        let runner = self.runners.for_variant(job.variant).clone();
        let path = PathBuf::from(&job.file_path);

        let simulate_progress = match job.variant {
            AnalysisVariant::Classification => true,
            AnalysisVariant::Prediction => {
                self.report_progress(job_id, PREDICTION_PROGRESS).await;
                false
            }
        };
        let run = self
            .run_supervised(&job, runner.as_ref(), &path, simulate_progress)
            .await;

        let label = variant_label(job.variant);
        let output = match run {
            Ok(output) => output,
            Err(e) => {
                warn!(job_id = %job_id, kind = e.kind(), error = %e, "Analysis runner failed");
                self.fail(job_id, format!("{} failed: {}", label, e)).await;
                return;
            }
        };

        let interpretation = match interpreter::interpret(&output.stdout, job.variant) {
            Outcome::Usable(i) => i,
            Outcome::Failed(msg) => {
                self.fail(job_id, format!("{} error: {}", label, msg)).await;
                return;
            }
            Outcome::Unparseable(e) => match job.variant {
                AnalysisVariant::Classification => {
                    debug!(job_id = %job_id, reason = %e, "Unstructured classifier output, storing degraded result");
                    Interpretation::degraded()
                }
                AnalysisVariant::Prediction => {
                    self.fail(job_id, format!("Failed to parse prediction results: {}", e))
                        .await;
                    return;
                }
            },
        };

        let result = build_result(job_id, interpretation, &output, runner.model_version());
        self.complete(job_id, result).await;
    }

    /// Drive the runner while refreshing the heartbeat and, for
    /// classification, advancing progress on a fixed cadence
    async fn run_supervised(
        &self,
        job: &Job,
        runner: &dyn AnalysisRunner,
        path: &Path,
        simulate_progress: bool,
    ) -> Result<RunOutput, crate::services::runner::RunnerError> {
        let run = runner.run(path);
        tokio::pin!(run);

        let mut ticker = tokio::time::interval(self.settings.progress_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut heartbeat = tokio::time::interval(self.settings.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let mut progress = job.progress;
        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = ticker.tick(), if simulate_progress => {
                    if progress < PROGRESS_CEILING {
                        progress = (progress + PROGRESS_STEP).min(PROGRESS_CEILING);
                        self.report_progress(job.id, progress).await;
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self.store.touch_heartbeat(job.id, Utc::now()).await {
                        warn!(job_id = %job.id, error = %e, "Failed to refresh heartbeat");
                    }
                }
            }
        }
    }

    async fn report_progress(&self, job_id: Uuid, progress: u8) {
        match self.store.update_progress(job_id, progress).await {
            Ok(true) => {
                self.events.emit(PipelineEvent::JobProgress {
                    job_id,
                    progress,
                    timestamp: Utc::now(),
                });
            }
            Ok(false) => {}
            Err(e) => warn!(job_id = %job_id, error = %e, "Failed to update progress"),
        }
    }

    async fn complete(&self, job_id: Uuid, result: AnalysisResult) {
        match self.store.complete_with_result(&result, Utc::now()).await {
            Ok(true) => {
                self.events.emit(PipelineEvent::JobProgress {
                    job_id,
                    progress: 100,
                    timestamp: Utc::now(),
                });
                self.emit_status(job_id, JobStatus::Processing, JobStatus::Completed);
                info!(
                    job_id = %job_id,
                    diagnosis = %result.primary_diagnosis,
                    confidence = result.confidence,
                    risk_level = %result.risk_level,
                    "Job completed"
                );
            }
            Ok(false) => {
                info!(job_id = %job_id, "Job left processing before completion, result discarded");
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to save result");
                self.fail(job_id, format!("Failed to save results: {}", e)).await;
            }
        }
    }

    async fn fail(&self, job_id: Uuid, message: String) {
        match self.store.mark_failed(job_id, &message, Utc::now()).await {
            Ok(true) => {
                self.emit_status(job_id, JobStatus::Processing, JobStatus::Failed);
                warn!(job_id = %job_id, error = %message, "Job failed");
            }
            Ok(false) => {
                info!(job_id = %job_id, "Job left processing before failure was recorded");
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to record job failure");
            }
        }
    }

    /// Force a queued or processing job to `cancelled`
    ///
    /// An in-flight runner is not interrupted; its eventual result is discarded.
    pub async fn cancel(&self, job_id: Uuid) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;
        if job.is_terminal() {
            return Err(PipelineError::InvalidState { status: job.status });
        }

        if !self.store.cancel_job(job_id, Utc::now()).await? {
            let current = self.require_job(job_id).await?;
            return Err(PipelineError::InvalidState {
                status: current.status,
            });
        }
        self.emit_status(job_id, job.status, JobStatus::Cancelled);
        info!(job_id = %job_id, previous = %job.status, "Job cancelled");

        self.require_job(job_id).await
    }

    /// Administrative status override, bypassing the lifecycle rules
    ///
    /// Terminal statuses stamp completed-at and non-terminal ones clear it.
    /// `completed` is refused for a job without a result, and a completed job
    /// (whose result is permanent) cannot be moved to another status.
    pub async fn update_status(&self, job_id: Uuid, status: JobStatus) -> PipelineResult<Job> {
        let job = self.require_job(job_id).await?;
        if job.status == JobStatus::Completed && status != JobStatus::Completed {
            return Err(PipelineError::InvalidState { status: job.status });
        }
        if status == JobStatus::Completed && job.result_id.is_none() {
            return Err(PipelineError::InvalidInput(
                "A job without a result cannot be marked completed".to_string(),
            ));
        }

        if !self.store.set_status(job_id, status, Utc::now()).await? {
            return Err(match self.store.get_job(job_id).await? {
                None => PipelineError::NotFound(format!("Job not found: {}", job_id)),
                Some(current) if current.status == JobStatus::Completed => {
                    PipelineError::InvalidState {
                        status: current.status,
                    }
                }
                Some(_) => PipelineError::InvalidInput(
                    "A job without a result cannot be marked completed".to_string(),
                ),
            });
        }
        if job.status != status {
            self.emit_status(job_id, job.status, status);
        }
        info!(job_id = %job_id, from = %job.status, to = %status, "Job status overridden");

        self.require_job(job_id).await
    }

    pub async fn update_priority(&self, job_id: Uuid, priority: Priority) -> PipelineResult<Job> {
        if !self.store.set_priority(job_id, priority).await? {
            return Err(PipelineError::NotFound(format!("Job not found: {}", job_id)));
        }
        debug!(job_id = %job_id, priority = %priority, "Job priority updated");
        self.require_job(job_id).await
    }

    /// Remove a terminal job with its result, metadata and stored file
    pub async fn delete(&self, job_id: Uuid) -> PipelineResult<()> {
        let job = self.require_job(job_id).await?;
        if !job.is_terminal() {
            return Err(PipelineError::InvalidState { status: job.status });
        }

        if !self.store.delete_job(job_id).await? {
            let current = self.require_job(job_id).await?;
            return Err(PipelineError::InvalidState {
                status: current.status,
            });
        }

        // Only files inside the upload root are ever removed
        match confine_to_root(&self.upload_root, Path::new(&job.file_path)) {
            Ok(path) => remove_artifact(&path).await,
            Err(e) => warn!(job_id = %job_id, error = %e, "Stored file outside upload root, not removed"),
        }

        info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    /// Job with its result (if linked)
    pub async fn get(&self, job_id: Uuid) -> PipelineResult<JobWithResult> {
        let job = self.require_job(job_id).await?;
        let result = match job.result_id {
            Some(_) => self.store.get_result(job_id).await?,
            None => None,
        };
        Ok(JobWithResult { job, result })
    }

    /// Owner's jobs, newest first
    pub async fn list(&self, owner_id: i64, filter: &JobFilter) -> PipelineResult<Vec<Job>> {
        Ok(self.store.list_jobs(owner_id, filter).await?)
    }

    /// Owner's completed jobs with results, most recently completed first
    pub async fn results(&self, owner_id: i64) -> PipelineResult<Vec<JobWithResult>> {
        Ok(self.store.list_results(owner_id).await?)
    }

    /// Metadata record, if validation has run
    pub async fn metadata(&self, job_id: Uuid) -> PipelineResult<Option<FileMetadata>> {
        self.require_job(job_id).await?;
        Ok(self.store.get_metadata(job_id).await?)
    }

    /// Fail processing jobs abandoned by a process that stopped
    ///
    /// A job counts as abandoned once its heartbeat is older than the
    /// configured staleness window, so jobs still executing in another
    /// process sharing the database are left alone.
    pub async fn recover_interrupted(&self) -> PipelineResult<u64> {
        let now = Utc::now();
        let window = ChronoDuration::from_std(self.settings.stale_after).map_err(|e| {
            PipelineError::InvalidInput(format!("Staleness window out of range: {}", e))
        })?;
        let stale_before = now.checked_sub_signed(window).ok_or_else(|| {
            PipelineError::InvalidInput("Staleness window out of range".to_string())
        })?;

        let moved = self
            .store
            .fail_stale_jobs(INTERRUPTED_MESSAGE, stale_before, now)
            .await?;
        if moved > 0 {
            warn!(jobs = moved, "Marked interrupted jobs as failed");
        }
        Ok(moved)
    }

    async fn require_job(&self, job_id: Uuid) -> PipelineResult<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("Job not found: {}", job_id)))
    }

    fn emit_status(&self, job_id: Uuid, old_status: JobStatus, new_status: JobStatus) {
        self.events.emit(PipelineEvent::JobStatusChanged {
            job_id,
            old_status,
            new_status,
            timestamp: Utc::now(),
        });
    }
}

fn variant_label(variant: AnalysisVariant) -> &'static str {
    match variant {
        AnalysisVariant::Classification => "Classification",
        AnalysisVariant::Prediction => "Prediction",
    }
}

fn build_result(
    job_id: Uuid,
    interpretation: Interpretation,
    output: &RunOutput,
    model_version: &str,
) -> AnalysisResult {
    let text = String::from_utf8_lossy(&output.stdout).into_owned();

    AnalysisResult {
        id: Uuid::new_v4(),
        job_id,
        primary_diagnosis: interpretation.diagnosis,
        confidence: interpretation.confidence,
        risk_level: interpretation.risk_level,
        processing_time: output.elapsed.as_secs_f64(),
        model_version: model_version.to_string(),
        abnormal_segments: interpretation.abnormal_segments,
        detailed_results: text.clone(),
        raw_output: text,
        spectral_data: interpretation
            .spectral_data
            .unwrap_or_else(interpreter::placeholder_spectral),
        temporal_data: interpretation
            .temporal_data
            .unwrap_or_else(interpreter::placeholder_temporal),
        created_at: Utc::now(),
    }
}

/// Write a new file; never overwrites
async fn write_new_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed stored file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stored file"),
    }
}
