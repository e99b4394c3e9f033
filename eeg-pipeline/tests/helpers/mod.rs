//! Test Helper Utilities
//!
//! Shared utilities for eeg-pipeline integration tests

pub mod fake_runner;
pub mod recordings;
pub mod test_env;

// Re-export commonly used items
pub use fake_runner::{GatedRunner, ScriptedRunner};
pub use recordings::{recording_bytes, write_recording, write_rows};
pub use test_env::{runners, submission, TestEnv};
