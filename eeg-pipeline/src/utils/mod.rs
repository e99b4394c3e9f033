//! Utility modules for eeg-pipeline

pub mod db_retry;
pub mod paths;

pub use db_retry::retry_on_lock;
pub use paths::{confine_to_root, sanitize_base_name, storage_name};
