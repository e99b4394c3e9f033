//! Database initialization
//!
//! Creates the database on first run and applies the idempotent schema.
//! Connection-level pragmas (foreign keys, WAL, busy timeout) are set through
//! connect options so every pooled connection carries them.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::channel_columns;
use crate::config::DatabaseConfig;
use crate::Result;

/// Open (creating if needed) the database at `db_path` and apply the schema
pub async fn init_database(db_path: &Path, config: &DatabaseConfig) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Apply every CREATE statement (safe to call repeatedly)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_jobs_table(pool).await?;
    create_analysis_results_table(pool).await?;
    create_file_metadata_table(pool).await?;
    create_subjects_table(pool).await?;
    create_data_points_table(pool).await?;
    Ok(())
}

async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            subject_label TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL DEFAULT 0,
            variant TEXT NOT NULL,
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT,
            result_id TEXT,
            heartbeat_us INTEGER,
            UNIQUE (owner_id, subject_label)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_owner_status ON jobs(owner_id, status)")
        .execute(pool)
        .await?;

    // Databases created before the heartbeat column existed
    add_column_if_missing(pool, "jobs", "heartbeat_us", "INTEGER").await?;

    Ok(())
}

/// `ALTER TABLE ADD COLUMN` unless the column is already present
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    sql_type: &str,
) -> Result<()> {
    let existing: Vec<String> =
        sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{}')", table))
            .fetch_all(pool)
            .await?;

    if !existing.iter().any(|c| c == column) {
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, column, sql_type
        ))
        .execute(pool)
        .await?;
        info!("Schema sync: added {}.{}", table, column);
    }

    Ok(())
}

async fn create_analysis_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_results (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL UNIQUE REFERENCES jobs(id) ON DELETE CASCADE,
            primary_diagnosis TEXT NOT NULL,
            confidence REAL NOT NULL,
            risk_level TEXT NOT NULL,
            processing_time REAL NOT NULL,
            model_version TEXT NOT NULL,
            abnormal_segments INTEGER NOT NULL DEFAULT 0,
            detailed_results TEXT NOT NULL,
            raw_output TEXT NOT NULL,
            spectral_data TEXT NOT NULL,
            temporal_data TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_file_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_metadata (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL UNIQUE REFERENCES jobs(id) ON DELETE CASCADE,
            channels INTEGER NOT NULL DEFAULT 0,
            row_count INTEGER NOT NULL DEFAULT 0,
            sampling_rate INTEGER NOT NULL,
            duration_secs REAL NOT NULL DEFAULT 0,
            file_type TEXT NOT NULL,
            validated INTEGER NOT NULL DEFAULT 0,
            validation_error TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_subjects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS eeg_subjects (
            subject_label TEXT PRIMARY KEY,
            age INTEGER,
            gender TEXT,
            condition TEXT,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_data_points_table(pool: &SqlitePool) -> Result<()> {
    let channels = channel_columns()
        .iter()
        .map(|c| format!("{} REAL NOT NULL", c))
        .collect::<Vec<_>>()
        .join(",\n            ");

    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS eeg_data_points (
            subject_label TEXT NOT NULL REFERENCES eeg_subjects(subject_label) ON DELETE CASCADE,
            time_us INTEGER NOT NULL,
            {},
            PRIMARY KEY (subject_label, time_us)
        ) WITHOUT ROWID
        "#,
        channels
    );

    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}
