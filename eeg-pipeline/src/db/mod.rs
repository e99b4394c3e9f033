//! Database access for eeg-pipeline
//!
//! Free functions over a `SqlitePool`; [`crate::store::SqliteStore`] exposes
//! them through the record store traits.

pub mod jobs;
pub mod time_series;
