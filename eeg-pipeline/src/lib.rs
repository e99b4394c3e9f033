//! eeg-pipeline library interface
//!
//! Wires the record store, analysis runners, task spawner and event bus into
//! a [`Pipeline`] that the binary and the integration tests drive.

pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use crate::error::{PipelineError, PipelineResult};

use eeg_common::config::{database_path, ensure_directories, upload_dir, TomlConfig};
use eeg_common::db::init_database;
use eeg_common::events::EventBus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::services::{CommandRunner, Importer, JobManager, ManagerSettings, Runners, TaskSpawner};
use crate::store::SqliteStore;

/// Event bus capacity for pipeline events
const EVENT_BUS_CAPACITY: usize = 256;

/// Fully wired pipeline
#[derive(Clone)]
pub struct Pipeline {
    pub jobs: JobManager,
    pub importer: Importer,
    store: SqliteStore,
    events: EventBus,
    spawner: TaskSpawner,
    upload_root: PathBuf,
}

impl Pipeline {
    /// Open the pipeline rooted at `root_folder`
    ///
    /// Creates the root and upload directories and the database if missing,
    /// builds command runners from config, and fails any processing job
    /// whose executing process has stopped refreshing its heartbeat.
    pub async fn open(root_folder: &Path, config: &TomlConfig) -> PipelineResult<Self> {
        config.validate()?;

        let uploads = upload_dir(root_folder, config);
        ensure_directories(root_folder, &uploads)?;

        let db_path = database_path(root_folder, config);
        info!("Database: {}", db_path.display());
        let pool = init_database(&db_path, &config.database).await?;
        let store = SqliteStore::new(pool, config.database.max_lock_wait_ms);

        let runners = Runners {
            classification: Arc::new(CommandRunner::new(
                &config.runner.classification,
                config.runner.timeout_secs,
            )),
            prediction: Arc::new(CommandRunner::new(
                &config.runner.prediction,
                config.runner.timeout_secs,
            )),
        };

        let pipeline = Self::with_runners(store, runners, uploads, config);
        pipeline.jobs.recover_interrupted().await?;

        Ok(pipeline)
    }

    /// Assemble a pipeline from an opened store and explicit runners
    pub fn with_runners(
        store: SqliteStore,
        runners: Runners,
        upload_root: PathBuf,
        config: &TomlConfig,
    ) -> Self {
        let events = EventBus::new(EVENT_BUS_CAPACITY);
        let spawner = TaskSpawner::new(config.pipeline.max_concurrent_tasks);
        let shared = Arc::new(store.clone());

        let jobs = JobManager::new(
            shared.clone(),
            runners,
            spawner.clone(),
            events.clone(),
            upload_root.clone(),
            ManagerSettings {
                progress_interval: Duration::from_millis(config.pipeline.progress_interval_ms.max(1)),
                sampling_rate_hz: config.pipeline.sampling_rate_hz,
                heartbeat_interval: Duration::from_millis(config.pipeline.heartbeat_interval_ms.max(1)),
                stale_after: Duration::from_secs(config.pipeline.stale_after_secs),
            },
        );

        let importer = Importer::new(
            shared,
            spawner.clone(),
            events.clone(),
            upload_root.clone(),
            config.importer.clone(),
        );

        Self {
            jobs,
            importer,
            store,
            events,
            spawner,
            upload_root,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    /// Wait for every background task (execution, validation, import)
    pub async fn wait_idle(&self) {
        self.spawner.wait_idle().await;
    }

    /// Drain background work and close the database
    pub async fn shutdown(self) {
        self.spawner.wait_idle().await;
        self.store.pool().close().await;
    }
}
