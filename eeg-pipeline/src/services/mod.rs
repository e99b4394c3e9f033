//! Pipeline services
//!
//! - Job lifecycle manager (submission, execution, administrative overrides)
//! - External analysis runner and result interpreter
//! - Metadata validation of submitted files
//! - Time-series importer
//! - Background task spawner

pub mod eeg_csv;
pub mod importer;
pub mod interpreter;
pub mod job_manager;
pub mod metadata_validator;
pub mod runner;
pub mod task_spawner;

pub use importer::{ImportAck, Importer};
pub use interpreter::{interpret, risk_tier, Interpretation, Outcome};
pub use job_manager::{JobManager, ManagerSettings, Runners, Submission, INTERRUPTED_MESSAGE};
pub use runner::{AnalysisRunner, CommandRunner, RunOutput, RunnerError};
pub use task_spawner::TaskSpawner;
