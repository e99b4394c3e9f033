//! Analysis job model and lifecycle rules
//!
//! queued → processing → {completed | failed | cancelled}
//!
//! `cancelled` is reachable from queued or processing only; terminal states
//! are absorbing.

use chrono::{DateTime, Utc};
use eeg_common::{Error, JobStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Caller-facing urgency label (not consumed by scheduling)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    #[default]
    Normal,
    Routine,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::Normal => "normal",
            Priority::Routine => "routine",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urgent" => Ok(Priority::Urgent),
            "normal" | "" => Ok(Priority::Normal),
            "routine" => Ok(Priority::Routine),
            other => Err(Error::InvalidInput(format!("Unknown priority: {}", other))),
        }
    }
}

/// Which external routine analyzes the job's file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisVariant {
    /// Free-form classifier; unparseable output degrades to an "Unknown" result
    #[default]
    Classification,
    /// Pretrained-model prediction; output must be a self-reporting JSON object
    Prediction,
}

impl AnalysisVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisVariant::Classification => "classification",
            AnalysisVariant::Prediction => "prediction",
        }
    }
}

impl fmt::Display for AnalysisVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" | "classify" => Ok(AnalysisVariant::Classification),
            "prediction" | "predict" => Ok(AnalysisVariant::Prediction),
            other => Err(Error::InvalidInput(format!(
                "Unknown analysis variant: {}",
                other
            ))),
        }
    }
}

/// One tracked unit of analysis work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner_id: i64,
    /// Caller-supplied patient/subject label, unique per owner
    pub subject_label: String,
    /// Declared (unsanitized) upload name, kept for display and search
    pub file_name: String,
    /// Stored artifact path inside the upload root
    pub file_path: String,
    pub file_size: i64,
    pub variant: AnalysisVariant,
    pub status: JobStatus,
    pub priority: Priority,
    /// 0-100, non-decreasing while processing
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Set iff status is terminal
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result_id: Option<Uuid>,
}

impl Job {
    /// New job in `queued`
    pub fn new(
        owner_id: i64,
        subject_label: String,
        file_name: String,
        file_path: String,
        file_size: i64,
        variant: AnalysisVariant,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            subject_label,
            file_name,
            file_path,
            file_size,
            variant,
            status: JobStatus::Queued,
            priority,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            result_id: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Whether the automatic lifecycle permits `from → to`
///
/// Administrative status overrides bypass this check.
pub fn transition_allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Queued, Processing)
            | (Queued, Cancelled)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, Cancelled)
    )
}

/// Job listing filter; `None` means "all"
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub priority: Option<Priority>,
    /// Case-insensitive substring of file name or subject label
    pub search: Option<String>,
}

impl JobFilter {
    /// Build from free-form query values where `"all"` or empty disables a filter
    pub fn from_query(
        status: Option<&str>,
        priority: Option<&str>,
        search: Option<&str>,
    ) -> eeg_common::Result<Self> {
        let active = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
                .map(str::to_string)
        };

        Ok(Self {
            status: active(status).map(|s| s.parse()).transpose()?,
            priority: active(priority).map(|p| p.parse()).transpose()?,
            search: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}
