//! Pipeline test environment
//!
//! Temporary root folder with its own SQLite database (a file, so every pooled
//! connection sees the same data) and upload directory.

use eeg_common::config::TomlConfig;
use eeg_common::db::init_database;
use eeg_pipeline::models::{AnalysisVariant, Priority};
use eeg_pipeline::services::{AnalysisRunner, Runners, Submission};
use eeg_pipeline::store::SqliteStore;
use eeg_pipeline::Pipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use super::recordings::recording_bytes;

pub struct TestEnv {
    /// Must outlive the pipeline
    pub temp: TempDir,
    pub uploads: PathBuf,
    pub config: TomlConfig,
    pub pipeline: Pipeline,
}

impl TestEnv {
    /// Environment with default test config
    pub async fn new(runners: Runners) -> Self {
        Self::with_config(runners, |_| {}).await
    }

    /// Environment with config adjusted by `tweak`
    pub async fn with_config(runners: Runners, tweak: impl FnOnce(&mut TomlConfig)) -> Self {
        let temp = TempDir::new().unwrap();
        let uploads = temp.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        let mut config = TomlConfig::default();
        config.pipeline.progress_interval_ms = 10;
        tweak(&mut config);

        let pool = init_database(&temp.path().join("test.db"), &config.database)
            .await
            .unwrap();
        let store = SqliteStore::new(pool, config.database.max_lock_wait_ms);
        let pipeline = Pipeline::with_runners(store, runners, uploads.clone(), &config);

        Self {
            temp,
            uploads,
            config,
            pipeline,
        }
    }

    /// Files currently in the upload root
    pub fn stored_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.uploads)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

pub fn runners(
    classification: impl AnalysisRunner + 'static,
    prediction: impl AnalysisRunner + 'static,
) -> Runners {
    Runners {
        classification: Arc::new(classification),
        prediction: Arc::new(prediction),
    }
}

/// Classification submission of a well-formed recording
pub fn submission(owner_id: i64, subject_label: &str, rows: usize) -> Submission {
    Submission {
        owner_id,
        file_name: format!("{}.csv", subject_label),
        bytes: recording_bytes(rows),
        subject_label: subject_label.to_string(),
        priority: Priority::Normal,
        variant: AnalysisVariant::Classification,
    }
}
