//! Time-series subject and sample models

use chrono::{DateTime, Utc};
use eeg_common::db::CHANNEL_COUNT;
use serde::{Deserialize, Serialize};

/// Default number of points returned by a range query
pub const DEFAULT_POINT_LIMIT: i64 = 1000;

/// Hard ceiling on points returned by a range query
pub const MAX_POINT_LIMIT: i64 = 10_000;

/// Logical source of time-series data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_label: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub condition: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// One sampled instant, keyed by (time, subject_label)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub time: DateTime<Utc>,
    pub subject_label: String,
    pub channels: [f64; CHANNEL_COUNT],
}

/// Subject-scoped time window query
#[derive(Debug, Clone)]
pub struct PointQuery {
    pub subject_label: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl PointQuery {
    /// Build a query, clamping `limit` to [1, MAX_POINT_LIMIT] (default DEFAULT_POINT_LIMIT)
    pub fn new(
        subject_label: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Self {
        Self {
            subject_label: subject_label.into(),
            start,
            end,
            limit: clamp_limit(limit),
        }
    }
}

/// Page-size policy for range queries
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        None => DEFAULT_POINT_LIMIT,
        Some(n) => n.clamp(1, MAX_POINT_LIMIT),
    }
}

/// Outcome counts of one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Records seen in the file
    pub rows_read: u64,
    /// Records that parsed into a full, finite channel vector
    pub rows_accepted: u64,
    /// Records skipped (wrong arity, bad decimal, non-finite)
    pub rows_rejected: u64,
    /// Points actually written (accepted minus failed batches)
    pub rows_inserted: u64,
    pub batches_failed: u64,
}
