//! Data models for the analysis pipeline
//!
//! - Job lifecycle (queued → processing → terminal)
//! - Analysis results and file metadata
//! - Time-series subjects and points

pub mod analysis_result;
pub mod file_metadata;
pub mod job;
pub mod time_series;

pub use analysis_result::{AnalysisResult, JobWithResult, RiskTier};
pub use file_metadata::FileMetadata;
pub use job::{transition_allowed, AnalysisVariant, Job, JobFilter, Priority};
pub use time_series::{
    clamp_limit, DataPoint, ImportSummary, PointQuery, Subject, DEFAULT_POINT_LIMIT,
    MAX_POINT_LIMIT,
};
