//! # EEG Common Library
//!
//! Shared code for the EEG analysis pipeline crates:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Database schema initialization
//! - Job status vocabulary
//! - Event bus (PipelineEvent)

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod status;
pub mod time;

pub use error::{Error, Result};
pub use status::JobStatus;
