//! Time-series bulk importer
//!
//! Streams a recording into the store in fixed-size batches. Malformed rows
//! are skipped and counted. A failed batch is logged and the import moves on
//! to the next one, so partial imports are an expected outcome.
//!
//! Rows carry no timestamps. The series is anchored so it ends near "now":
//! `base = now - rows × interval`, and the k-th accepted row lands at
//! `base + k × interval`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use eeg_common::config::ImporterConfig;
use eeg_common::events::{EventBus, PipelineEvent};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::models::{DataPoint, ImportSummary, PointQuery, Subject};
use crate::services::eeg_csv::{count_records, open_reader, parse_channels};
use crate::services::task_spawner::TaskSpawner;
use crate::store::TimeSeriesStore;
use crate::utils::confine_to_root;

/// Batches buffered between the file reader and the store writer
const BATCH_QUEUE_DEPTH: usize = 2;

/// Immediate acknowledgement of an accepted import request
#[derive(Debug, Clone, Serialize)]
pub struct ImportAck {
    pub subject_label: String,
    pub file_path: PathBuf,
}

#[derive(Clone)]
pub struct Importer {
    store: Arc<dyn TimeSeriesStore>,
    spawner: TaskSpawner,
    events: EventBus,
    upload_root: PathBuf,
    config: ImporterConfig,
}

impl Importer {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        spawner: TaskSpawner,
        events: EventBus,
        upload_root: PathBuf,
        config: ImporterConfig,
    ) -> Self {
        Self {
            store,
            spawner,
            events,
            upload_root,
            config,
        }
    }

    /// Validate the request and start the import in the background
    ///
    /// `file_path` must resolve inside the upload root. Completion is only
    /// observable through later queries, logs or the event bus.
    pub fn import(&self, file_path: &Path, subject_label: &str) -> PipelineResult<ImportAck> {
        let subject_label = validate_label(subject_label)?;
        let resolved = confine_to_root(&self.upload_root, file_path)?;
        if !resolved.is_file() {
            return Err(PipelineError::NotFound(format!(
                "File not found: {}",
                file_path.display()
            )));
        }

        let importer = self.clone();
        let path = resolved.clone();
        let label = subject_label.clone();
        self.spawner.spawn("import", async move {
            if let Err(e) = importer.run_import(&path, &label).await {
                error!(
                    subject_label = %label,
                    file = %path.display(),
                    error = %e,
                    "Time-series import failed"
                );
            }
        });

        info!(subject_label = %subject_label, file = %resolved.display(), "Import started");

        Ok(ImportAck {
            subject_label,
            file_path: resolved,
        })
    }

    /// Import `path` for `subject_label` and wait for completion
    pub async fn run_import(&self, path: &Path, subject_label: &str) -> PipelineResult<ImportSummary> {
        let subject_label = validate_label(subject_label)?;
        let interval_us = sample_interval(&self.config)?;
        let description = format!(
            "Imported from {}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );

        if self.store.ensure_subject(&subject_label, &description).await? {
            info!(subject_label = %subject_label, "Created time-series subject");
        } else {
            debug!(subject_label = %subject_label, "Reusing existing time-series subject");
        }

        let batch_size = self.config.batch_size.max(1);

        let (tx, mut rx) = mpsc::channel::<Vec<DataPoint>>(BATCH_QUEUE_DEPTH);
        let reader_path = path.to_path_buf();
        let reader_label = subject_label.clone();
        let reader = tokio::task::spawn_blocking(move || {
            read_batches(&reader_path, &reader_label, interval_us, batch_size, Utc::now(), tx)
        });

        let mut rows_inserted = 0u64;
        let mut batches_failed = 0u64;
        let mut batch_index = 0u64;
        while let Some(batch) = rx.recv().await {
            batch_index += 1;
            match self.store.insert_points(&batch).await {
                Ok(n) => {
                    rows_inserted += n;
                    debug!(
                        subject_label = %subject_label,
                        batch = batch_index,
                        rows = n,
                        "Inserted batch"
                    );
                }
                Err(e) => {
                    batches_failed += 1;
                    error!(
                        subject_label = %subject_label,
                        batch = batch_index,
                        rows = batch.len(),
                        error = %e,
                        "Failed to insert batch, continuing"
                    );
                }
            }
        }

        let counts = reader
            .await
            .map_err(|e| PipelineError::Common(eeg_common::Error::Internal(format!(
                "Import reader task failed: {}",
                e
            ))))??;

        let summary = ImportSummary {
            rows_read: counts.rows_read,
            rows_accepted: counts.rows_accepted,
            rows_rejected: counts.rows_read - counts.rows_accepted,
            rows_inserted,
            batches_failed,
        };

        if summary.rows_rejected > 0 || summary.batches_failed > 0 {
            warn!(
                subject_label = %subject_label,
                rows_read = summary.rows_read,
                rows_accepted = summary.rows_accepted,
                rows_rejected = summary.rows_rejected,
                rows_inserted = summary.rows_inserted,
                batches_failed = summary.batches_failed,
                "Import completed with skipped rows or failed batches"
            );
        } else {
            info!(
                subject_label = %subject_label,
                rows_read = summary.rows_read,
                rows_inserted = summary.rows_inserted,
                "Import completed"
            );
        }

        self.events.emit(PipelineEvent::ImportCompleted {
            subject_label: subject_label.clone(),
            rows_read: summary.rows_read,
            rows_accepted: summary.rows_accepted,
            rows_rejected: summary.rows_rejected,
            rows_inserted: summary.rows_inserted,
            batches_failed: summary.batches_failed,
            timestamp: Utc::now(),
        });

        Ok(summary)
    }

    /// Import every `s*.csv` in `dir`, one after another; label = file stem
    ///
    /// Operator bulk load: the directory is not confined to the upload root.
    pub async fn import_directory(&self, dir: &Path) -> PipelineResult<Vec<(String, ImportSummary)>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_subject_file(p))
            .collect();
        files.sort();

        info!(dir = %dir.display(), files = files.len(), "Starting directory import");

        let mut results = Vec::with_capacity(files.len());
        for path in files {
            let label = match path.file_stem() {
                Some(stem) => stem.to_string_lossy().into_owned(),
                None => continue,
            };
            match self.run_import(&path, &label).await {
                Ok(summary) => results.push((label, summary)),
                Err(e) => error!(
                    subject_label = %label,
                    file = %path.display(),
                    error = %e,
                    "Directory import: file failed, continuing"
                ),
            }
        }

        Ok(results)
    }

    pub async fn subjects(&self) -> PipelineResult<Vec<Subject>> {
        Ok(self.store.list_subjects().await?)
    }

    /// Range query; `limit` defaults to 1000 and is clamped to [1, 10000]
    pub async fn points(
        &self,
        subject_label: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> PipelineResult<Vec<DataPoint>> {
        let query = PointQuery::new(subject_label, start, end, limit);
        Ok(self.store.query_points(&query).await?)
    }

    pub async fn count(&self, subject_label: &str) -> PipelineResult<u64> {
        Ok(self.store.count_points(subject_label).await?)
    }

    /// Delete a subject and all its points; returns the number of points removed
    pub async fn purge(&self, subject_label: &str) -> PipelineResult<u64> {
        match self.store.purge_subject(subject_label).await? {
            Some(points) => {
                info!(subject_label = %subject_label, points, "Purged time-series subject");
                Ok(points)
            }
            None => Err(PipelineError::NotFound(format!(
                "Subject not found: {}",
                subject_label
            ))),
        }
    }
}

fn validate_label(subject_label: &str) -> PipelineResult<String> {
    let label = subject_label.trim();
    if label.is_empty() {
        return Err(PipelineError::InvalidInput(
            "Subject label is required".to_string(),
        ));
    }
    Ok(label.to_string())
}

/// Configured sample spacing as signed microseconds
fn sample_interval(config: &ImporterConfig) -> PipelineResult<i64> {
    i64::try_from(config.sample_interval_us.max(1)).map_err(|_| {
        PipelineError::InvalidInput(format!(
            "Sample interval out of range: {} us",
            config.sample_interval_us
        ))
    })
}

fn is_subject_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    name.starts_with('s')
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

#[derive(Debug, Default)]
struct ReadCounts {
    rows_read: u64,
    rows_accepted: u64,
}

/// Blocking side of an import: parse rows, stamp them and hand off full batches
fn read_batches(
    path: &Path,
    subject_label: &str,
    interval_us: i64,
    batch_size: usize,
    now: DateTime<Utc>,
    tx: mpsc::Sender<Vec<DataPoint>>,
) -> PipelineResult<ReadCounts> {
    let total = count_records(path)?;
    let span = interval_us.checked_mul(total as i64);
    let base = span
        .and_then(|us| now.checked_sub_signed(ChronoDuration::microseconds(us)))
        .ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "{} rows at {} us spacing exceed the representable time range",
                total, interval_us
            ))
        })?;

    let mut reader = open_reader(path)?;
    let mut counts = ReadCounts::default();
    let mut batch = Vec::with_capacity(batch_size);

    for result in reader.records() {
        counts.rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(_) => continue,
        };
        let channels = match parse_channels(&record) {
            Some(c) => c,
            None => continue,
        };

        let offset = ChronoDuration::microseconds(interval_us * counts.rows_accepted as i64);
        counts.rows_accepted += 1;
        batch.push(DataPoint {
            time: base + offset,
            subject_label: subject_label.to_string(),
            channels,
        });

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.blocking_send(full).is_err() {
                // Receiver gone; nothing left to write to
                return Ok(counts);
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.blocking_send(batch);
    }

    Ok(counts)
}
