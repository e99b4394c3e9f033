//! Background validation of submitted recordings
//!
//! Produces the FileMetadata side record: channel count, row count, duration
//! at the configured sampling rate, and whether the file looks like a usable
//! 19-channel recording. A failed validation is recorded; it never fails the
//! job.

use chrono::Utc;
use eeg_common::db::CHANNEL_COUNT;
use eeg_common::events::{EventBus, PipelineEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::FileMetadata;
use crate::services::eeg_csv::{open_reader, parse_channels};
use crate::store::JobStore;

/// Inspect `path` and build its metadata record for `job_id`
///
/// Blocking; run off the async executor.
pub fn inspect_file(job_id: Uuid, path: &Path, sampling_rate: u32) -> FileMetadata {
    let file_type = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    let mut meta = FileMetadata {
        id: Uuid::new_v4(),
        job_id,
        channels: 0,
        row_count: 0,
        sampling_rate: sampling_rate as i64,
        duration_secs: 0.0,
        file_type,
        validated: false,
        validation_error: None,
        created_at: Utc::now(),
    };

    if !path.is_file() {
        meta.validation_error = Some("File not found".to_string());
        return meta;
    }

    let mut reader = match open_reader(path) {
        Ok(reader) => reader,
        Err(e) => {
            meta.validation_error = Some(format!("Failed to open file: {}", e));
            return meta;
        }
    };

    let mut valid_rows = 0i64;
    for (idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                meta.validation_error = Some(format!("Row {} unreadable: {}", idx + 1, e));
                return meta;
            }
        };
        if idx == 0 {
            meta.channels = record.len() as i64;
        }
        meta.row_count += 1;
        if parse_channels(&record).is_some() {
            valid_rows += 1;
        }
    }

    if sampling_rate > 0 {
        meta.duration_secs = meta.row_count as f64 / sampling_rate as f64;
    }

    meta.validation_error = if meta.row_count == 0 {
        Some("File contains no rows".to_string())
    } else if meta.channels != CHANNEL_COUNT as i64 {
        Some(format!(
            "Expected {} channels, found {}",
            CHANNEL_COUNT, meta.channels
        ))
    } else if valid_rows == 0 {
        Some("No row contains valid decimal channel values".to_string())
    } else {
        None
    };
    meta.validated = meta.validation_error.is_none();

    meta
}

/// Validate a submitted file and persist the result
pub async fn validate_and_record(
    store: Arc<dyn JobStore>,
    events: EventBus,
    job_id: Uuid,
    path: PathBuf,
    sampling_rate: u32,
) {
    let meta = match tokio::task::spawn_blocking(move || inspect_file(job_id, &path, sampling_rate))
        .await
    {
        Ok(meta) => meta,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Metadata validation task panicked");
            return;
        }
    };

    debug!(
        job_id = %job_id,
        channels = meta.channels,
        rows = meta.row_count,
        validated = meta.validated,
        "File metadata extracted"
    );

    // Fails when the job was deleted before validation finished
    if let Err(e) = store.save_metadata(&meta).await {
        warn!(job_id = %job_id, error = %e, "Failed to save file metadata");
        return;
    }

    events.emit(PipelineEvent::MetadataValidated {
        job_id,
        validated: meta.validated,
        validation_error: meta.validation_error.clone(),
        timestamp: Utc::now(),
    });
}
