//! Job lifecycle: submission, execution, cancellation, deletion, overrides

mod helpers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eeg_common::events::{EventBus, PipelineEvent};
use eeg_common::JobStatus;
use eeg_pipeline::models::{
    AnalysisResult, AnalysisVariant, FileMetadata, Job, JobFilter, JobWithResult, Priority,
    RiskTier,
};
use eeg_pipeline::services::{JobManager, ManagerSettings, TaskSpawner, INTERRUPTED_MESSAGE};
use eeg_pipeline::store::{JobStore, SqliteStore};
use helpers::{runners, submission, GatedRunner, ScriptedRunner, TestEnv};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SEIZURE: &str = r#"{"diagnosis":"Seizure","confidence":92,"abnormal_segments":3}"#;

fn default_runners() -> eeg_pipeline::services::Runners {
    runners(
        ScriptedRunner::ok(SEIZURE),
        ScriptedRunner::ok(r#"{"success":true,"primary_diagnosis":"Normal","confidence":55}"#),
    )
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_submit_creates_queued_job_and_validates_file() {
    let env = TestEnv::new(default_runners()).await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 512)).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.progress, 0);
    assert_eq!(job.file_name, "P1.csv");
    assert!(job.completed_at.is_none());

    let stored = env.stored_files();
    assert_eq!(stored.len(), 1);
    let stored_name = stored[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(stored_name.ends_with("_P1.csv"), "{}", stored_name);
    assert_eq!(std::fs::metadata(&stored[0]).unwrap().len() as i64, job.file_size);

    env.pipeline.wait_idle().await;

    let meta = env.pipeline.jobs.metadata(job.id).await.unwrap().unwrap();
    assert!(meta.validated, "{:?}", meta.validation_error);
    assert_eq!(meta.channels, 19);
    assert_eq!(meta.row_count, 512);
    assert_eq!(meta.duration_secs, 2.0);

    // Validation never changes the job itself
    let job = env.pipeline.jobs.get(job.id).await.unwrap().job;
    assert_eq!(job.status, JobStatus::Queued);
}

#[tokio::test]
async fn test_invalid_file_is_recorded_but_job_stays_queued() {
    let env = TestEnv::new(default_runners()).await;

    let mut sub = submission(1, "P1", 0);
    sub.bytes = b"a,b,c\n1,2,3\n".to_vec();
    let job = env.pipeline.jobs.submit(sub).await.unwrap();
    env.pipeline.wait_idle().await;

    let meta = env.pipeline.jobs.metadata(job.id).await.unwrap().unwrap();
    assert!(!meta.validated);
    assert!(meta.validation_error.is_some());
    assert_eq!(
        env.pipeline.jobs.get(job.id).await.unwrap().job.status,
        JobStatus::Queued
    );
}

#[tokio::test]
async fn test_duplicate_subject_is_rejected_with_existing_id() {
    let env = TestEnv::new(default_runners()).await;

    let first = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    let err = env
        .pipeline
        .jobs
        .submit(submission(1, "P1", 10))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "DUPLICATE_SUBJECT");
    match err {
        eeg_pipeline::PipelineError::DuplicateSubject { existing_job_id } => {
            assert_eq!(existing_job_id, first.id)
        }
        other => panic!("unexpected {:?}", other),
    }

    let jobs = env.pipeline.jobs.list(1, &JobFilter::default()).await.unwrap();
    assert_eq!(jobs.len(), 1);
    // Rejected before any file was written
    assert_eq!(env.stored_files().len(), 1);

    // Same label under another owner is fine
    env.pipeline.jobs.submit(submission(2, "P1", 10)).await.unwrap();
}

#[tokio::test]
async fn test_empty_subject_label_rejected() {
    let env = TestEnv::new(default_runners()).await;

    let err = env
        .pipeline
        .jobs
        .submit(submission(1, "   ", 10))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    assert!(env.stored_files().is_empty());
}

#[tokio::test]
async fn test_declared_name_cannot_escape_upload_root() {
    let env = TestEnv::new(default_runners()).await;

    let mut sub = submission(1, "P1", 10);
    sub.file_name = "../../outside.csv".to_string();
    let job = env.pipeline.jobs.submit(sub).await.unwrap();

    let stored = Path::new(&job.file_path);
    assert!(stored.starts_with(env.uploads.canonicalize().unwrap()));
    assert!(!env.temp.path().join("outside.csv").exists());

    let mut sub = submission(1, "P2", 10);
    sub.file_name = "..".to_string();
    let err = env.pipeline.jobs.submit(sub).await.unwrap_err();
    assert_eq!(err.code(), "PATH_REJECTED");
    assert_eq!(env.stored_files().len(), 1);
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_classification_completes_with_linked_result() {
    let classifier = ScriptedRunner::ok(SEIZURE).with_delay(Duration::from_millis(60));
    let env = TestEnv::new(runners(classifier.clone(), ScriptedRunner::ok("{}"))).await;
    let mut events = env.pipeline.events().subscribe();

    let job = env.pipeline.jobs.submit(submission(1, "P1", 50)).await.unwrap();
    let started = env.pipeline.jobs.start(job.id).await.unwrap();
    assert!(started.started_at.is_some());
    assert_ne!(started.status, JobStatus::Queued);

    env.pipeline.wait_idle().await;

    let done = env.pipeline.jobs.get(job.id).await.unwrap();
    assert_eq!(done.job.status, JobStatus::Completed);
    assert_eq!(done.job.progress, 100);
    assert!(done.job.completed_at.is_some());
    assert!(done.job.error_message.is_none());

    let result = done.result.expect("completed job has a result");
    assert_eq!(Some(result.id), done.job.result_id);
    assert_eq!(result.primary_diagnosis, "Seizure");
    assert_eq!(result.confidence, 92.0);
    assert_eq!(result.risk_level, RiskTier::High);
    assert_eq!(result.abnormal_segments, 3);
    assert_eq!(result.model_version, "test-model");
    assert_eq!(result.raw_output, SEIZURE);
    assert!(!result.spectral_data.is_empty());
    assert!(!result.temporal_data.is_empty());

    assert_eq!(classifier.calls(), vec![Path::new(&job.file_path).to_path_buf()]);

    // Progress as observed through events never goes backwards
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::JobProgress { job_id, progress, .. } = event {
            if job_id == job.id {
                seen.push(progress);
            }
        }
    }
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    assert!(seen.iter().filter(|p| **p < 100).all(|p| *p <= 90));
}

#[tokio::test]
async fn test_start_requires_queued() {
    let env = TestEnv::new(default_runners()).await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    env.pipeline.wait_idle().await;

    let err = env.pipeline.jobs.start(job.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    let err = env.pipeline.jobs.start(uuid::Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_runner_failure_fails_job_with_stderr() {
    let env = TestEnv::new(runners(
        ScriptedRunner::failing("Traceback: model file missing"),
        ScriptedRunner::ok("{}"),
    ))
    .await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    env.pipeline.wait_idle().await;

    let done = env.pipeline.jobs.get(job.id).await.unwrap();
    assert_eq!(done.job.status, JobStatus::Failed);
    assert!(done.job.completed_at.is_some());
    assert!(done.result.is_none());
    assert!(done.job.result_id.is_none());
    let message = done.job.error_message.unwrap();
    assert!(message.starts_with("Classification failed:"), "{}", message);
    assert!(message.contains("Traceback: model file missing"), "{}", message);
    assert!(done.job.progress < 100);
}

#[tokio::test]
async fn test_unstructured_classifier_output_degrades() {
    let env = TestEnv::new(runners(
        ScriptedRunner::ok("Result: probably normal\n"),
        ScriptedRunner::ok("{}"),
    ))
    .await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    env.pipeline.wait_idle().await;

    let done = env.pipeline.jobs.get(job.id).await.unwrap();
    assert_eq!(done.job.status, JobStatus::Completed);
    let result = done.result.unwrap();
    assert_eq!(result.primary_diagnosis, "Unknown");
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.risk_level, RiskTier::Low);
    assert_eq!(result.detailed_results, "Result: probably normal\n");
}

async fn run_prediction(stdout: &str) -> (TestEnv, eeg_pipeline::models::JobWithResult) {
    let env = TestEnv::new(runners(
        ScriptedRunner::ok(SEIZURE),
        ScriptedRunner::ok(stdout).with_model_version("CNN-LSTM v1.0 (Pre-trained)"),
    ))
    .await;

    let mut sub = submission(1, "P1", 10);
    sub.variant = AnalysisVariant::Prediction;
    let job = env.pipeline.jobs.submit(sub).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    env.pipeline.wait_idle().await;

    let done = env.pipeline.jobs.get(job.id).await.unwrap();
    (env, done)
}

#[tokio::test]
async fn test_prediction_success() {
    let (_env, done) = run_prediction(
        r#"{"success":true,"primary_diagnosis":"Epileptic","confidence":81.5,"abnormal_segments":7}"#,
    )
    .await;

    assert_eq!(done.job.status, JobStatus::Completed);
    let result = done.result.unwrap();
    assert_eq!(result.primary_diagnosis, "Epileptic");
    assert_eq!(result.confidence, 81.5);
    assert_eq!(result.risk_level, RiskTier::Medium);
    assert_eq!(result.model_version, "CNN-LSTM v1.0 (Pre-trained)");
}

#[tokio::test]
async fn test_prediction_reported_failure() {
    let (_env, done) = run_prediction(r#"{"success":false,"error":"model not loaded"}"#).await;

    assert_eq!(done.job.status, JobStatus::Failed);
    assert_eq!(
        done.job.error_message.as_deref(),
        Some("Prediction error: model not loaded")
    );
    assert!(done.result.is_none());
}

#[tokio::test]
async fn test_prediction_unparseable_output_fails() {
    let (_env, done) = run_prediction("Loading model...\nDone").await;

    assert_eq!(done.job.status, JobStatus::Failed);
    assert!(done
        .job
        .error_message
        .unwrap()
        .starts_with("Failed to parse prediction results:"));
    assert_eq!(done.job.progress, 50);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_queued_job() {
    let env = TestEnv::new(default_runners()).await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    let cancelled = env.pipeline.jobs.cancel(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    // Terminal states are absorbing
    let err = env.pipeline.jobs.cancel(job.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
    let err = env.pipeline.jobs.start(job.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
}

#[tokio::test]
async fn test_cancel_completed_job_rejected() {
    let env = TestEnv::new(default_runners()).await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    env.pipeline.wait_idle().await;

    let err = env.pipeline.jobs.cancel(job.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    let done = env.pipeline.jobs.get(job.id).await.unwrap();
    assert_eq!(done.job.status, JobStatus::Completed);
    assert!(done.result.is_some());
}

#[tokio::test]
async fn test_cancel_during_processing_discards_late_result() {
    let gated = GatedRunner::new(SEIZURE);
    let env = TestEnv::new(runners(gated.clone(), ScriptedRunner::ok("{}"))).await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    gated.wait_started().await;

    let cancelled = env.pipeline.jobs.cancel(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    gated.release();
    env.pipeline.wait_idle().await;

    let done = env.pipeline.jobs.get(job.id).await.unwrap();
    assert_eq!(done.job.status, JobStatus::Cancelled);
    assert!(done.job.result_id.is_none());
    assert!(done.result.is_none());
    assert!(env.pipeline.store().get_result(job.id).await.unwrap().is_none());
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_delete_rejects_active_jobs() {
    let gated = GatedRunner::new(SEIZURE);
    let env = TestEnv::new(runners(gated.clone(), ScriptedRunner::ok("{}"))).await;

    let queued = env.pipeline.jobs.submit(submission(1, "Q", 10)).await.unwrap();
    let err = env.pipeline.jobs.delete(queued.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    let running = env.pipeline.jobs.submit(submission(1, "R", 10)).await.unwrap();
    env.pipeline.jobs.start(running.id).await.unwrap();
    gated.wait_started().await;
    let err = env.pipeline.jobs.delete(running.id).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");

    gated.release();
    env.pipeline.wait_idle().await;
    assert_eq!(env.stored_files().len(), 2);
}

#[tokio::test]
async fn test_delete_completed_job_removes_everything() {
    let env = TestEnv::new(default_runners()).await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    env.pipeline.wait_idle().await;
    assert!(env.pipeline.jobs.metadata(job.id).await.unwrap().is_some());

    env.pipeline.jobs.delete(job.id).await.unwrap();

    let err = env.pipeline.jobs.get(job.id).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    let store = env.pipeline.store();
    assert!(store.get_result(job.id).await.unwrap().is_none());
    assert!(store.get_metadata(job.id).await.unwrap().is_none());
    assert!(env.stored_files().is_empty());

    // Label is free again
    env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
}

#[tokio::test]
async fn test_delete_failed_and_cancelled_jobs() {
    let env = TestEnv::new(runners(
        ScriptedRunner::failing("boom"),
        ScriptedRunner::ok("{}"),
    ))
    .await;

    let failed = env.pipeline.jobs.submit(submission(1, "F", 10)).await.unwrap();
    env.pipeline.jobs.start(failed.id).await.unwrap();
    let cancelled = env.pipeline.jobs.submit(submission(1, "C", 10)).await.unwrap();
    env.pipeline.jobs.cancel(cancelled.id).await.unwrap();
    env.pipeline.wait_idle().await;

    env.pipeline.jobs.delete(failed.id).await.unwrap();
    env.pipeline.jobs.delete(cancelled.id).await.unwrap();
    assert!(env
        .pipeline
        .jobs
        .list(1, &JobFilter::default())
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// Administrative overrides and queries
// ============================================================================

#[tokio::test]
async fn test_status_override_stamps_and_clears_completed_at() {
    let env = TestEnv::new(default_runners()).await;
    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();

    let cancelled = env
        .pipeline
        .jobs
        .update_status(job.id, JobStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    let requeued = env
        .pipeline
        .jobs
        .update_status(job.id, JobStatus::Queued)
        .await
        .unwrap();
    assert_eq!(requeued.status, JobStatus::Queued);
    assert!(requeued.completed_at.is_none());

    let err = env
        .pipeline
        .jobs
        .update_status(job.id, JobStatus::Completed)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[tokio::test]
async fn test_completed_job_status_cannot_be_overridden() {
    let env = TestEnv::new(default_runners()).await;
    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    env.pipeline.wait_idle().await;

    for target in [JobStatus::Failed, JobStatus::Queued, JobStatus::Cancelled] {
        let err = env
            .pipeline
            .jobs
            .update_status(job.id, target)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE", "override to {}", target);
    }

    let done = env.pipeline.jobs.get(job.id).await.unwrap();
    assert_eq!(done.job.status, JobStatus::Completed);
    assert_eq!(done.result.map(|r| r.id), done.job.result_id);
    assert!(done.job.result_id.is_some());

    // Re-asserting completed is harmless
    let same = env
        .pipeline
        .jobs
        .update_status(job.id, JobStatus::Completed)
        .await
        .unwrap();
    assert_eq!(same.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_priority_override_and_list_filters() {
    let env = TestEnv::new(default_runners()).await;

    let a = env.pipeline.jobs.submit(submission(1, "alpha", 10)).await.unwrap();
    let b = env.pipeline.jobs.submit(submission(1, "beta", 10)).await.unwrap();
    env.pipeline.jobs.submit(submission(2, "gamma", 10)).await.unwrap();

    let updated = env
        .pipeline
        .jobs
        .update_priority(a.id, Priority::Urgent)
        .await
        .unwrap();
    assert_eq!(updated.priority, Priority::Urgent);

    let all = env.pipeline.jobs.list(1, &JobFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    // Newest first
    assert_eq!(all[0].id, b.id);

    let urgent = JobFilter::from_query(None, Some("urgent"), None).unwrap();
    let found = env.pipeline.jobs.list(1, &urgent).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, a.id);

    let search = JobFilter::from_query(Some("all"), Some("all"), Some("BET")).unwrap();
    let found = env.pipeline.jobs.list(1, &search).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, b.id);

    // LIKE wildcards in the search text match literally
    env.pipeline.jobs.submit(submission(1, "a_c", 10)).await.unwrap();
    env.pipeline.jobs.submit(submission(1, "abc", 10)).await.unwrap();
    let underscore = JobFilter::from_query(None, None, Some("a_c")).unwrap();
    let found = env.pipeline.jobs.list(1, &underscore).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].subject_label, "a_c");
    let percent = JobFilter::from_query(None, None, Some("%")).unwrap();
    assert!(env.pipeline.jobs.list(1, &percent).await.unwrap().is_empty());

    let err = env
        .pipeline
        .jobs
        .update_priority(uuid::Uuid::new_v4(), Priority::Routine)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_results_lists_completed_jobs_only() {
    let env = TestEnv::new(default_runners()).await;

    let done = env.pipeline.jobs.submit(submission(1, "done", 10)).await.unwrap();
    env.pipeline.jobs.start(done.id).await.unwrap();
    env.pipeline.jobs.submit(submission(1, "waiting", 10)).await.unwrap();
    env.pipeline.wait_idle().await;

    let results = env.pipeline.jobs.results(1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].job.id, done.id);
    assert_eq!(results[0].result.as_ref().unwrap().primary_diagnosis, "Seizure");
}

#[tokio::test]
async fn test_recover_interrupted_fails_only_stale_processing_jobs() {
    let env = TestEnv::new(default_runners()).await;
    let store = env.pipeline.store();

    let stuck = env.pipeline.jobs.submit(submission(1, "stuck", 10)).await.unwrap();
    let live = env.pipeline.jobs.submit(submission(1, "live", 10)).await.unwrap();
    let queued = env.pipeline.jobs.submit(submission(1, "queued", 10)).await.unwrap();
    let an_hour_ago = chrono::Utc::now() - chrono::Duration::hours(1);
    assert!(store.mark_processing(stuck.id, an_hour_ago).await.unwrap());
    assert!(store.mark_processing(live.id, chrono::Utc::now()).await.unwrap());

    let moved = env.pipeline.jobs.recover_interrupted().await.unwrap();
    assert_eq!(moved, 1);

    let live = env.pipeline.jobs.get(live.id).await.unwrap().job;
    assert_eq!(live.status, JobStatus::Processing);

    let stuck = env.pipeline.jobs.get(stuck.id).await.unwrap().job;
    assert_eq!(stuck.status, JobStatus::Failed);
    assert_eq!(stuck.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert!(stuck.completed_at.is_some());

    let queued = env.pipeline.jobs.get(queued.id).await.unwrap().job;
    assert_eq!(queued.status, JobStatus::Queued);
}

#[tokio::test]
async fn test_heartbeat_keeps_long_running_job_alive() {
    let gated = GatedRunner::new(SEIZURE);
    let env = TestEnv::with_config(runners(gated.clone(), ScriptedRunner::ok("{}")), |c| {
        c.pipeline.heartbeat_interval_ms = 50;
        c.pipeline.stale_after_secs = 1;
    })
    .await;

    let job = env.pipeline.jobs.submit(submission(1, "P1", 10)).await.unwrap();
    env.pipeline.jobs.start(job.id).await.unwrap();
    gated.wait_started().await;

    // Outlive the staleness window while the runner is still busy
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(env.pipeline.jobs.recover_interrupted().await.unwrap(), 0);

    gated.release();
    env.pipeline.wait_idle().await;
    assert_eq!(
        env.pipeline.jobs.get(job.id).await.unwrap().job.status,
        JobStatus::Completed
    );
}

// ============================================================================
// Persistence failures
// ============================================================================

/// Delegates to SQLite but refuses to save analysis results
struct ResultSaveFails {
    inner: SqliteStore,
}

#[async_trait]
impl JobStore for ResultSaveFails {
    async fn insert_job(&self, job: &Job) -> eeg_common::Result<()> {
        self.inner.insert_job(job).await
    }

    async fn find_job_by_subject(
        &self,
        owner_id: i64,
        subject_label: &str,
    ) -> eeg_common::Result<Option<Uuid>> {
        self.inner.find_job_by_subject(owner_id, subject_label).await
    }

    async fn get_job(&self, job_id: Uuid) -> eeg_common::Result<Option<Job>> {
        self.inner.get_job(job_id).await
    }

    async fn list_jobs(&self, owner_id: i64, filter: &JobFilter) -> eeg_common::Result<Vec<Job>> {
        self.inner.list_jobs(owner_id, filter).await
    }

    async fn mark_processing(&self, job_id: Uuid, started_at: DateTime<Utc>) -> eeg_common::Result<bool> {
        self.inner.mark_processing(job_id, started_at).await
    }

    async fn touch_heartbeat(&self, job_id: Uuid, at: DateTime<Utc>) -> eeg_common::Result<bool> {
        self.inner.touch_heartbeat(job_id, at).await
    }

    async fn update_progress(&self, job_id: Uuid, progress: u8) -> eeg_common::Result<bool> {
        self.inner.update_progress(job_id, progress).await
    }

    async fn complete_with_result(
        &self,
        _result: &AnalysisResult,
        _completed_at: DateTime<Utc>,
    ) -> eeg_common::Result<bool> {
        Err(eeg_common::Error::Internal("disk full".to_string()))
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        message: &str,
        completed_at: DateTime<Utc>,
    ) -> eeg_common::Result<bool> {
        self.inner.mark_failed(job_id, message, completed_at).await
    }

    async fn cancel_job(&self, job_id: Uuid, completed_at: DateTime<Utc>) -> eeg_common::Result<bool> {
        self.inner.cancel_job(job_id, completed_at).await
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus, at: DateTime<Utc>) -> eeg_common::Result<bool> {
        self.inner.set_status(job_id, status, at).await
    }

    async fn set_priority(&self, job_id: Uuid, priority: Priority) -> eeg_common::Result<bool> {
        self.inner.set_priority(job_id, priority).await
    }

    async fn delete_job(&self, job_id: Uuid) -> eeg_common::Result<bool> {
        self.inner.delete_job(job_id).await
    }

    async fn get_result(&self, job_id: Uuid) -> eeg_common::Result<Option<AnalysisResult>> {
        self.inner.get_result(job_id).await
    }

    async fn list_results(&self, owner_id: i64) -> eeg_common::Result<Vec<JobWithResult>> {
        self.inner.list_results(owner_id).await
    }

    async fn save_metadata(&self, meta: &FileMetadata) -> eeg_common::Result<()> {
        self.inner.save_metadata(meta).await
    }

    async fn get_metadata(&self, job_id: Uuid) -> eeg_common::Result<Option<FileMetadata>> {
        self.inner.get_metadata(job_id).await
    }

    async fn fail_stale_jobs(
        &self,
        message: &str,
        stale_before: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> eeg_common::Result<u64> {
        self.inner.fail_stale_jobs(message, stale_before, completed_at).await
    }
}

#[tokio::test]
async fn test_result_save_failure_fails_job() {
    let env = TestEnv::new(default_runners()).await;
    let spawner = TaskSpawner::new(2);
    let manager = JobManager::new(
        Arc::new(ResultSaveFails {
            inner: env.pipeline.store().clone(),
        }),
        default_runners(),
        spawner.clone(),
        EventBus::new(16),
        env.uploads.clone(),
        ManagerSettings {
            progress_interval: Duration::from_millis(10),
            ..ManagerSettings::default()
        },
    );

    let job = manager.submit(submission(1, "P1", 10)).await.unwrap();
    manager.start(job.id).await.unwrap();
    spawner.wait_idle().await;

    let done = manager.get(job.id).await.unwrap();
    assert_eq!(done.job.status, JobStatus::Failed);
    let message = done.job.error_message.unwrap();
    assert!(message.starts_with("Failed to save results:"), "{}", message);
    assert!(message.contains("disk full"), "{}", message);
    assert!(done.job.result_id.is_none());
    assert!(done.result.is_none());
    assert!(env.pipeline.store().get_result(job.id).await.unwrap().is_none());
}
