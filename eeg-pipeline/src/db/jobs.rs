//! Job, result and file metadata persistence
//!
//! Lifecycle writes are conditional updates: each one names the status it
//! expects to replace and reports whether it matched. Callers treat a `false`
//! return as "someone else moved the job first".

use chrono::{DateTime, Utc};
use eeg_common::time::{parse_rfc3339, parse_rfc3339_opt, to_micros};
use eeg_common::{Error, JobStatus, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{AnalysisResult, FileMetadata, Job, JobFilter, JobWithResult, Priority};
use crate::utils::retry_on_lock;

const JOB_COLUMNS: &str = "id, owner_id, subject_label, file_name, file_path, file_size, variant, \
     status, priority, progress, created_at, started_at, completed_at, error_message, result_id";

const RESULT_COLUMNS: &str = "id, job_id, primary_diagnosis, confidence, risk_level, \
     processing_time, model_version, abnormal_segments, detailed_results, raw_output, \
     spectral_data, temporal_data, created_at";

fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: String = row.get("id");
    let variant: String = row.get("variant");
    let status: String = row.get("status");
    let priority: String = row.get("priority");
    let progress: i64 = row.get("progress");
    let created_at: String = row.get("created_at");
    let result_id: Option<String> = row.get("result_id");

    Ok(Job {
        id: parse_uuid("id", &id)?,
        owner_id: row.get("owner_id"),
        subject_label: row.get("subject_label"),
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        file_size: row.get("file_size"),
        variant: variant.parse()?,
        status: status.parse()?,
        priority: priority.parse()?,
        progress: progress.clamp(0, 100) as u8,
        created_at: parse_rfc3339("created_at", &created_at)?,
        started_at: parse_rfc3339_opt("started_at", row.get("started_at"))?,
        completed_at: parse_rfc3339_opt("completed_at", row.get("completed_at"))?,
        error_message: row.get("error_message"),
        result_id: result_id
            .map(|s| parse_uuid("result_id", &s))
            .transpose()?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<AnalysisResult> {
    let id: String = row.get("id");
    let job_id: String = row.get("job_id");
    let risk_level: String = row.get("risk_level");
    let created_at: String = row.get("created_at");

    Ok(AnalysisResult {
        id: parse_uuid("id", &id)?,
        job_id: parse_uuid("job_id", &job_id)?,
        primary_diagnosis: row.get("primary_diagnosis"),
        confidence: row.get("confidence"),
        risk_level: risk_level.parse()?,
        processing_time: row.get("processing_time"),
        model_version: row.get("model_version"),
        abnormal_segments: row.get("abnormal_segments"),
        detailed_results: row.get("detailed_results"),
        raw_output: row.get("raw_output"),
        spectral_data: row.get("spectral_data"),
        temporal_data: row.get("temporal_data"),
        created_at: parse_rfc3339("created_at", &created_at)?,
    })
}

fn metadata_from_row(row: &SqliteRow) -> Result<FileMetadata> {
    let id: String = row.get("id");
    let job_id: String = row.get("job_id");
    let validated: i64 = row.get("validated");
    let created_at: String = row.get("created_at");

    Ok(FileMetadata {
        id: parse_uuid("id", &id)?,
        job_id: parse_uuid("job_id", &job_id)?,
        channels: row.get("channels"),
        row_count: row.get("row_count"),
        sampling_rate: row.get("sampling_rate"),
        duration_secs: row.get("duration_secs"),
        file_type: row.get("file_type"),
        validated: validated != 0,
        validation_error: row.get("validation_error"),
        created_at: parse_rfc3339("created_at", &created_at)?,
    })
}

/// Insert a new job
///
/// A duplicate (owner, subject label) surfaces as a database error for which
/// [`Error::is_unique_violation`] is true.
pub async fn insert_job(pool: &SqlitePool, job: &Job, max_wait_ms: u64) -> Result<()> {
    let id = job.id.to_string();
    let created_at = job.created_at.to_rfc3339();

    retry_on_lock("insert_job", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, owner_id, subject_label, file_name, file_path, file_size,
                variant, status, priority, progress, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(job.owner_id)
        .bind(&job.subject_label)
        .bind(&job.file_name)
        .bind(&job.file_path)
        .bind(job.file_size)
        .bind(job.variant.as_str())
        .bind(job.status.as_str())
        .bind(job.priority.as_str())
        .bind(job.progress as i64)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

/// Id of the owner's job carrying `subject_label`, if any
pub async fn find_job_by_subject(
    pool: &SqlitePool,
    owner_id: i64,
    subject_label: &str,
) -> Result<Option<Uuid>> {
    let id: Option<String> =
        sqlx::query_scalar("SELECT id FROM jobs WHERE owner_id = ? AND subject_label = ?")
            .bind(owner_id)
            .bind(subject_label)
            .fetch_optional(pool)
            .await?;

    id.map(|s| parse_uuid("id", &s)).transpose()
}

pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<Job>> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Owner's jobs, newest first
pub async fn list_jobs(pool: &SqlitePool, owner_id: i64, filter: &JobFilter) -> Result<Vec<Job>> {
    let mut sql = format!("SELECT {} FROM jobs WHERE owner_id = ?", JOB_COLUMNS);
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if filter.priority.is_some() {
        sql.push_str(" AND priority = ?");
    }
    if filter.search.is_some() {
        sql.push_str(
            r" AND (LOWER(file_name) LIKE ? ESCAPE '\' OR LOWER(subject_label) LIKE ? ESCAPE '\')",
        );
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query(&sql).bind(owner_id);
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if let Some(priority) = filter.priority {
        query = query.bind(priority.as_str());
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
        query = query.bind(pattern.clone()).bind(pattern);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(job_from_row).collect()
}

/// Literal match for user text inside a `LIKE ... ESCAPE '\'` pattern
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// queued → processing; resets progress, stamps started_at and the first heartbeat
pub async fn mark_processing(
    pool: &SqlitePool,
    job_id: Uuid,
    started_at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = job_id.to_string();
    let heartbeat_us = to_micros(started_at);
    let started_at = started_at.to_rfc3339();

    retry_on_lock("mark_processing", max_wait_ms, || async {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing', progress = 0, started_at = ?, heartbeat_us = ?
            WHERE id = ? AND status = 'queued'
            "#,
        )
        .bind(&started_at)
        .bind(heartbeat_us)
        .bind(&id)
        .execute(pool)
        .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

/// Record that the executing process is still alive
pub async fn touch_heartbeat(
    pool: &SqlitePool,
    job_id: Uuid,
    at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = job_id.to_string();
    let heartbeat_us = to_micros(at);

    retry_on_lock("touch_heartbeat", max_wait_ms, || async {
        let done = sqlx::query(
            "UPDATE jobs SET heartbeat_us = ? WHERE id = ? AND status = 'processing'",
        )
        .bind(heartbeat_us)
        .bind(&id)
        .execute(pool)
        .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

/// Raise progress of a processing job; never lowers it
pub async fn update_progress(
    pool: &SqlitePool,
    job_id: Uuid,
    progress: u8,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = job_id.to_string();
    let progress = progress.min(100) as i64;

    retry_on_lock("update_progress", max_wait_ms, || async {
        let done = sqlx::query(
            "UPDATE jobs SET progress = ? WHERE id = ? AND status = 'processing' AND progress <= ?",
        )
        .bind(progress)
        .bind(&id)
        .bind(progress)
        .execute(pool)
        .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

/// Persist `result` and move its job processing → completed in one transaction
///
/// Returns `false` (and writes nothing) when the job is no longer processing.
pub async fn complete_with_result(
    pool: &SqlitePool,
    result: &AnalysisResult,
    completed_at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<bool> {
    let job_id = result.job_id.to_string();
    let result_id = result.id.to_string();
    let completed_at = completed_at.to_rfc3339();
    let created_at = result.created_at.to_rfc3339();

    retry_on_lock("complete_with_result", max_wait_ms, || async {
        let mut tx = pool.begin().await?;

        let moved = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', progress = 100, completed_at = ?, result_id = ?,
                error_message = NULL
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(&completed_at)
        .bind(&result_id)
        .bind(&job_id)
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO analysis_results (
                id, job_id, primary_diagnosis, confidence, risk_level, processing_time,
                model_version, abnormal_segments, detailed_results, raw_output,
                spectral_data, temporal_data, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result_id)
        .bind(&job_id)
        .bind(&result.primary_diagnosis)
        .bind(result.confidence)
        .bind(result.risk_level.as_str())
        .bind(result.processing_time)
        .bind(&result.model_version)
        .bind(result.abnormal_segments)
        .bind(&result.detailed_results)
        .bind(&result.raw_output)
        .bind(&result.spectral_data)
        .bind(&result.temporal_data)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    })
    .await
}

/// processing → failed with `message`; progress is left as-is
pub async fn mark_failed(
    pool: &SqlitePool,
    job_id: Uuid,
    message: &str,
    completed_at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = job_id.to_string();
    let completed_at = completed_at.to_rfc3339();

    retry_on_lock("mark_failed", max_wait_ms, || async {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', error_message = ?, completed_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(message)
        .bind(&completed_at)
        .bind(&id)
        .execute(pool)
        .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

/// queued | processing → cancelled
pub async fn cancel_job(
    pool: &SqlitePool,
    job_id: Uuid,
    completed_at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = job_id.to_string();
    let completed_at = completed_at.to_rfc3339();

    retry_on_lock("cancel_job", max_wait_ms, || async {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled', completed_at = ?
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(&completed_at)
        .bind(&id)
        .execute(pool)
        .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

/// Administrative status override
///
/// Terminal statuses stamp completed_at; non-terminal statuses clear it.
/// `completed` only applies to a job that already has a linked result, and a
/// completed job stays completed.
pub async fn set_status(
    pool: &SqlitePool,
    job_id: Uuid,
    status: JobStatus,
    at: DateTime<Utc>,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = job_id.to_string();
    let completed_at = status.is_terminal().then(|| at.to_rfc3339());
    let requires_result = status == JobStatus::Completed;

    retry_on_lock("set_status", max_wait_ms, || async {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, completed_at = ?
            WHERE id = ?
              AND (? = 0 OR result_id IS NOT NULL)
              AND (? = 1 OR status <> 'completed')
            "#,
        )
        .bind(status.as_str())
        .bind(&completed_at)
        .bind(&id)
        .bind(requires_result as i64)
        .bind(requires_result as i64)
        .execute(pool)
        .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

pub async fn set_priority(
    pool: &SqlitePool,
    job_id: Uuid,
    priority: Priority,
    max_wait_ms: u64,
) -> Result<bool> {
    let id = job_id.to_string();

    retry_on_lock("set_priority", max_wait_ms, || async {
        let done = sqlx::query("UPDATE jobs SET priority = ? WHERE id = ?")
            .bind(priority.as_str())
            .bind(&id)
            .execute(pool)
            .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

/// Delete a terminal job; its result and metadata go with it (ON DELETE CASCADE)
pub async fn delete_job(pool: &SqlitePool, job_id: Uuid, max_wait_ms: u64) -> Result<bool> {
    let id = job_id.to_string();

    retry_on_lock("delete_job", max_wait_ms, || async {
        let done = sqlx::query(
            "DELETE FROM jobs WHERE id = ? AND status IN ('completed', 'failed', 'cancelled')",
        )
        .bind(&id)
        .execute(pool)
        .await?;

        Ok(done.rows_affected() == 1)
    })
    .await
}

pub async fn load_result(pool: &SqlitePool, job_id: Uuid) -> Result<Option<AnalysisResult>> {
    let sql = format!(
        "SELECT {} FROM analysis_results WHERE job_id = ?",
        RESULT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(result_from_row).transpose()
}

/// Owner's completed jobs with results, most recently completed first
pub async fn list_results(pool: &SqlitePool, owner_id: i64) -> Result<Vec<JobWithResult>> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE owner_id = ? AND status = 'completed' ORDER BY completed_at DESC",
        JOB_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(owner_id).fetch_all(pool).await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let job = job_from_row(row)?;
        let result = load_result(pool, job.id).await?;
        out.push(JobWithResult { job, result });
    }
    Ok(out)
}

/// Insert or replace the metadata record of a job
pub async fn save_metadata(pool: &SqlitePool, meta: &FileMetadata, max_wait_ms: u64) -> Result<()> {
    let id = meta.id.to_string();
    let job_id = meta.job_id.to_string();
    let created_at = meta.created_at.to_rfc3339();

    retry_on_lock("save_metadata", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO file_metadata (
                id, job_id, channels, row_count, sampling_rate, duration_secs,
                file_type, validated, validation_error, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                channels = excluded.channels,
                row_count = excluded.row_count,
                sampling_rate = excluded.sampling_rate,
                duration_secs = excluded.duration_secs,
                file_type = excluded.file_type,
                validated = excluded.validated,
                validation_error = excluded.validation_error
            "#,
        )
        .bind(&id)
        .bind(&job_id)
        .bind(meta.channels)
        .bind(meta.row_count)
        .bind(meta.sampling_rate)
        .bind(meta.duration_secs)
        .bind(&meta.file_type)
        .bind(meta.validated as i64)
        .bind(&meta.validation_error)
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

pub async fn load_metadata(pool: &SqlitePool, job_id: Uuid) -> Result<Option<FileMetadata>> {
    let row = sqlx::query(
        r#"
        SELECT id, job_id, channels, row_count, sampling_rate, duration_secs,
               file_type, validated, validation_error, created_at
        FROM file_metadata
        WHERE job_id = ?
        "#,
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(metadata_from_row).transpose()
}

/// Fail processing jobs whose heartbeat is missing or older than `stale_before`
///
/// Returns the number of jobs moved.
pub async fn fail_stale_jobs(
    pool: &SqlitePool,
    message: &str,
    stale_before: DateTime<Utc>,
    completed_at: DateTime<Utc>,
) -> Result<u64> {
    let done = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed', error_message = ?, completed_at = ?
        WHERE status = 'processing'
          AND (heartbeat_us IS NULL OR heartbeat_us < ?)
        "#,
    )
    .bind(message)
    .bind(completed_at.to_rfc3339())
    .bind(to_micros(stale_before))
    .execute(pool)
    .await?;

    Ok(done.rows_affected())
}
