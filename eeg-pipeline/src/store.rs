//! Record store seams
//!
//! The job lifecycle manager and the importer depend on these traits rather
//! than on SQLite directly, so tests can substitute fakes (a store whose
//! batch insert fails, for example). [`SqliteStore`] is the production
//! implementation over [`crate::db`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eeg_common::{JobStatus, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::models::{
    AnalysisResult, DataPoint, FileMetadata, Job, JobFilter, JobWithResult, PointQuery, Priority,
    Subject,
};

/// Jobs, results and file metadata
///
/// Every lifecycle write is conditional and returns whether it applied.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> Result<()>;

    async fn find_job_by_subject(&self, owner_id: i64, subject_label: &str)
        -> Result<Option<Uuid>>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>>;

    async fn list_jobs(&self, owner_id: i64, filter: &JobFilter) -> Result<Vec<Job>>;

    /// queued → processing
    async fn mark_processing(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<bool>;

    /// Refresh the liveness stamp of a processing job
    async fn touch_heartbeat(&self, job_id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Raise progress while processing (never lowers it)
    async fn update_progress(&self, job_id: Uuid, progress: u8) -> Result<bool>;

    /// processing → completed, atomically with the result insert
    async fn complete_with_result(
        &self,
        result: &AnalysisResult,
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// processing → failed
    async fn mark_failed(
        &self,
        job_id: Uuid,
        message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// queued | processing → cancelled
    async fn cancel_job(&self, job_id: Uuid, completed_at: DateTime<Utc>) -> Result<bool>;

    /// Administrative override; `completed` requires a linked result
    async fn set_status(&self, job_id: Uuid, status: JobStatus, at: DateTime<Utc>)
        -> Result<bool>;

    async fn set_priority(&self, job_id: Uuid, priority: Priority) -> Result<bool>;

    /// Remove a terminal job with its result and metadata
    async fn delete_job(&self, job_id: Uuid) -> Result<bool>;

    async fn get_result(&self, job_id: Uuid) -> Result<Option<AnalysisResult>>;

    async fn list_results(&self, owner_id: i64) -> Result<Vec<JobWithResult>>;

    async fn save_metadata(&self, meta: &FileMetadata) -> Result<()>;

    async fn get_metadata(&self, job_id: Uuid) -> Result<Option<FileMetadata>>;

    /// Fail processing jobs whose heartbeat predates `stale_before`; returns how many moved
    async fn fail_stale_jobs(
        &self,
        message: &str,
        stale_before: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<u64>;
}

/// Time-series subjects and points
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Create-if-absent; true when created
    async fn ensure_subject(&self, subject_label: &str, description: &str) -> Result<bool>;

    /// Insert one batch atomically
    async fn insert_points(&self, points: &[DataPoint]) -> Result<u64>;

    async fn list_subjects(&self) -> Result<Vec<Subject>>;

    async fn get_subject(&self, subject_label: &str) -> Result<Option<Subject>>;

    async fn query_points(&self, query: &PointQuery) -> Result<Vec<DataPoint>>;

    async fn count_points(&self, subject_label: &str) -> Result<u64>;

    /// `None` when the subject does not exist
    async fn purge_subject(&self, subject_label: &str) -> Result<Option<u64>>;
}

/// SQLite-backed record store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        db::jobs::insert_job(&self.pool, job, self.max_lock_wait_ms).await
    }

    async fn find_job_by_subject(
        &self,
        owner_id: i64,
        subject_label: &str,
    ) -> Result<Option<Uuid>> {
        db::jobs::find_job_by_subject(&self.pool, owner_id, subject_label).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        db::jobs::load_job(&self.pool, job_id).await
    }

    async fn list_jobs(&self, owner_id: i64, filter: &JobFilter) -> Result<Vec<Job>> {
        db::jobs::list_jobs(&self.pool, owner_id, filter).await
    }

    async fn mark_processing(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<bool> {
        db::jobs::mark_processing(&self.pool, job_id, started_at, self.max_lock_wait_ms).await
    }

    async fn touch_heartbeat(&self, job_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        db::jobs::touch_heartbeat(&self.pool, job_id, at, self.max_lock_wait_ms).await
    }

    async fn update_progress(&self, job_id: Uuid, progress: u8) -> Result<bool> {
        db::jobs::update_progress(&self.pool, job_id, progress, self.max_lock_wait_ms).await
    }

    async fn complete_with_result(
        &self,
        result: &AnalysisResult,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        db::jobs::complete_with_result(&self.pool, result, completed_at, self.max_lock_wait_ms)
            .await
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        message: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        db::jobs::mark_failed(
            &self.pool,
            job_id,
            message,
            completed_at,
            self.max_lock_wait_ms,
        )
        .await
    }

    async fn cancel_job(&self, job_id: Uuid, completed_at: DateTime<Utc>) -> Result<bool> {
        db::jobs::cancel_job(&self.pool, job_id, completed_at, self.max_lock_wait_ms).await
    }

    async fn set_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        db::jobs::set_status(&self.pool, job_id, status, at, self.max_lock_wait_ms).await
    }

    async fn set_priority(&self, job_id: Uuid, priority: Priority) -> Result<bool> {
        db::jobs::set_priority(&self.pool, job_id, priority, self.max_lock_wait_ms).await
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<bool> {
        db::jobs::delete_job(&self.pool, job_id, self.max_lock_wait_ms).await
    }

    async fn get_result(&self, job_id: Uuid) -> Result<Option<AnalysisResult>> {
        db::jobs::load_result(&self.pool, job_id).await
    }

    async fn list_results(&self, owner_id: i64) -> Result<Vec<JobWithResult>> {
        db::jobs::list_results(&self.pool, owner_id).await
    }

    async fn save_metadata(&self, meta: &FileMetadata) -> Result<()> {
        db::jobs::save_metadata(&self.pool, meta, self.max_lock_wait_ms).await
    }

    async fn get_metadata(&self, job_id: Uuid) -> Result<Option<FileMetadata>> {
        db::jobs::load_metadata(&self.pool, job_id).await
    }

    async fn fail_stale_jobs(
        &self,
        message: &str,
        stale_before: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<u64> {
        db::jobs::fail_stale_jobs(&self.pool, message, stale_before, completed_at).await
    }
}

#[async_trait]
impl TimeSeriesStore for SqliteStore {
    async fn ensure_subject(&self, subject_label: &str, description: &str) -> Result<bool> {
        db::time_series::ensure_subject(&self.pool, subject_label, description, self.max_lock_wait_ms)
            .await
    }

    async fn insert_points(&self, points: &[DataPoint]) -> Result<u64> {
        db::time_series::insert_points(&self.pool, points, self.max_lock_wait_ms).await
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>> {
        db::time_series::list_subjects(&self.pool).await
    }

    async fn get_subject(&self, subject_label: &str) -> Result<Option<Subject>> {
        db::time_series::load_subject(&self.pool, subject_label).await
    }

    async fn query_points(&self, query: &PointQuery) -> Result<Vec<DataPoint>> {
        db::time_series::query_points(&self.pool, query).await
    }

    async fn count_points(&self, subject_label: &str) -> Result<u64> {
        db::time_series::count_points(&self.pool, subject_label).await
    }

    async fn purge_subject(&self, subject_label: &str) -> Result<Option<u64>> {
        db::time_series::purge_subject(&self.pool, subject_label, self.max_lock_wait_ms).await
    }
}
