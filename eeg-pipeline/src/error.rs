//! Error types for eeg-pipeline
//!
//! Synchronous boundaries (submit, start, cancel, delete, import) reject with a
//! `PipelineError`; each variant carries a stable reason code so front ends can
//! report failures without matching on message text.

use eeg_common::JobStatus;
use thiserror::Error;
use uuid::Uuid;

/// Boundary error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Job, subject or file does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed request value (empty subject label, unknown status text)
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    /// Path escapes the upload root or carries no usable base name
    #[error("Path rejected: {0}")]
    PathRejected(String),

    /// (owner, subject label) already has a job
    #[error("Subject label already submitted as job {existing_job_id}")]
    DuplicateSubject { existing_job_id: Uuid },

    /// Operation not permitted in the job's current status
    #[error("Operation not allowed while job is {status}")]
    InvalidState { status: JobStatus },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// eeg-common error
    #[error("Common error: {0}")]
    Common(#[from] eeg_common::Error),
}

impl PipelineError {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "NOT_FOUND",
            PipelineError::InvalidInput(_) => "INVALID_INPUT",
            PipelineError::PathRejected(_) => "PATH_REJECTED",
            PipelineError::DuplicateSubject { .. } => "DUPLICATE_SUBJECT",
            PipelineError::InvalidState { .. } => "INVALID_STATE",
            PipelineError::Io(_) => "IO_ERROR",
            PipelineError::Common(eeg_common::Error::NotFound(_)) => "NOT_FOUND",
            PipelineError::Common(eeg_common::Error::InvalidInput(_)) => "INVALID_INPUT",
            PipelineError::Common(eeg_common::Error::Io(_)) => "IO_ERROR",
            PipelineError::Common(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type for boundary operations
pub type PipelineResult<T> = Result<T, PipelineError>;
