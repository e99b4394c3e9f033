//! Side record produced by background validation of a submitted file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: Uuid,
    pub job_id: Uuid,
    /// Field count of the first row
    pub channels: i64,
    pub row_count: i64,
    pub sampling_rate: i64,
    /// row_count / sampling_rate
    pub duration_secs: f64,
    /// Lower-cased extension, e.g. ".csv"
    pub file_type: String,
    pub validated: bool,
    pub validation_error: Option<String>,
    pub created_at: DateTime<Utc>,
}
