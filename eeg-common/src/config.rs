//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from an optional TOML file. Every field has a
//! built-in default, so a missing file is a warning, not a startup failure.
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. `EEG_ROOT_FOLDER` environment variable
//! 3. TOML `root_folder`
//! 4. OS-dependent compiled default (fallback)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "EEG_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "eeg_pipeline.db";

/// Upload directory name inside the root folder
pub const UPLOAD_DIR_NAME: &str = "uploads";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder holding the database and upload directory
    pub root_folder: Option<PathBuf>,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub runner: RunnerConfig,
    pub pipeline: PipelineSettings,
    pub importer: ImporterConfig,
}

/// `[database]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Overrides `<root>/eeg_pipeline.db`
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    /// SQLite busy_timeout applied to every connection
    pub busy_timeout_ms: u64,
    /// Upper bound for retrying a write that hit "database is locked"
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 10,
            busy_timeout_ms: 250,
            max_lock_wait_ms: 5000,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One external analysis command
///
/// The job's file path is appended after `args` as the final positional argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Model/version tag stored on every result produced by this command
    pub model_version: String,
}

/// `[runner]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub classification: CommandConfig,
    pub prediction: CommandConfig,
    /// Per-invocation deadline in seconds; 0 disables it
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            classification: CommandConfig {
                program: "python3".to_string(),
                args: vec!["../Model/EEG_Classification_report.py".to_string()],
                model_version: "CNN-LSTM v1.0".to_string(),
            },
            prediction: CommandConfig {
                program: "python3".to_string(),
                args: vec!["../Model/predict_with_model.py".to_string()],
                model_version: "CNN-LSTM v1.0 (Pre-trained)".to_string(),
            },
            timeout_secs: 600,
        }
    }
}

/// `[pipeline]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Overrides `<root>/uploads`
    pub upload_dir: Option<PathBuf>,
    /// Interval between simulated progress steps while the runner is active
    pub progress_interval_ms: u64,
    /// Background tasks allowed to run at once
    pub max_concurrent_tasks: usize,
    /// Declared sampling rate recorded in file metadata
    pub sampling_rate_hz: u32,
    /// How often an executing process refreshes its jobs' heartbeat
    pub heartbeat_interval_ms: u64,
    /// Processing jobs whose heartbeat is older than this are failed at open
    pub stale_after_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            upload_dir: None,
            progress_interval_ms: 300,
            max_concurrent_tasks: 4,
            sampling_rate_hz: 256,
            heartbeat_interval_ms: 5000,
            stale_after_secs: 60,
        }
    }
}

/// `[importer]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    /// Rows per batched insert
    pub batch_size: usize,
    /// Synthetic spacing between consecutive valid rows (4000 us ≈ 256 Hz)
    pub sample_interval_us: u64,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            sample_interval_us: 4000,
        }
    }
}

/// Load TOML configuration
///
/// An explicit path must exist. Without one, the platform default location is
/// tried and a missing file yields built-in defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                warn!("No config file found, using built-in defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = parse_toml_config(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse TOML text into a config
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    let config: TomlConfig =
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
    config.validate()?;
    Ok(config)
}

impl TomlConfig {
    /// Reject values the pipeline cannot operate with
    pub fn validate(&self) -> Result<()> {
        let interval = self.importer.sample_interval_us;
        if interval == 0 || i64::try_from(interval).is_err() {
            return Err(Error::Config(format!(
                "importer.sample_interval_us out of range: {}",
                interval
            )));
        }

        let stale_ms = self.pipeline.stale_after_secs.saturating_mul(1000);
        if self.pipeline.heartbeat_interval_ms == 0 || stale_ms <= self.pipeline.heartbeat_interval_ms {
            return Err(Error::Config(format!(
                "pipeline.stale_after_secs ({}) must exceed pipeline.heartbeat_interval_ms ({})",
                self.pipeline.stale_after_secs, self.pipeline.heartbeat_interval_ms
            )));
        }

        Ok(())
    }
}

/// `~/.config/eeg-pipeline/config.toml` (platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("eeg-pipeline").join("config.toml"))
}

/// Resolve the root folder following the documented priority order
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        info!("Root folder: {} (from command line)", path.display());
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            info!("Root folder: {} (from {})", path, ROOT_FOLDER_ENV);
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        info!("Root folder: {} (from TOML)", path.display());
        return path.clone();
    }

    let path = default_root_folder();
    info!("Root folder: {} (compiled default)", path.display());
    path
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("eeg-pipeline"))
        .unwrap_or_else(|| PathBuf::from("./eeg_pipeline_data"))
}

/// Database path: TOML override or `<root>/eeg_pipeline.db`
pub fn database_path(root: &Path, toml: &TomlConfig) -> PathBuf {
    toml.database
        .path
        .clone()
        .unwrap_or_else(|| root.join(DATABASE_FILE_NAME))
}

/// Upload root: TOML override or `<root>/uploads`
pub fn upload_dir(root: &Path, toml: &TomlConfig) -> PathBuf {
    toml.pipeline
        .upload_dir
        .clone()
        .unwrap_or_else(|| root.join(UPLOAD_DIR_NAME))
}

/// Create the root folder and upload directory if missing
pub fn ensure_directories(root: &Path, uploads: &Path) -> Result<()> {
    for dir in [root, uploads] {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            info!("Created directory: {}", dir.display());
        }
    }
    Ok(())
}
