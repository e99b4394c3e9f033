//! Analysis result model
//!
//! Exactly one result per completed job; immutable once created.

use chrono::{DateTime, Utc};
use eeg_common::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Risk tier derived from confidence (or reported by the prediction runner)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(Error::InvalidInput(format!("Unknown risk tier: {}", other))),
        }
    }
}

/// Output of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub primary_diagnosis: String,
    /// 0-100 scale
    pub confidence: f64,
    pub risk_level: RiskTier,
    /// Runner wall-clock time in seconds
    pub processing_time: f64,
    pub model_version: String,
    pub abnormal_segments: i64,
    /// Serialized structured payload (raw text on degraded results)
    pub detailed_results: String,
    /// Runner stdout, verbatim
    pub raw_output: String,
    /// Serialized spectral visualization series
    pub spectral_data: String,
    /// Serialized temporal visualization series
    pub temporal_data: String,
    pub created_at: DateTime<Utc>,
}

/// Job together with its linked result, as returned by job queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWithResult {
    #[serde(flatten)]
    pub job: crate::models::Job,
    pub result: Option<AnalysisResult>,
}
