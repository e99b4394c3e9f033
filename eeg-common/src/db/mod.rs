//! Database schema and connection setup

pub mod init;

pub use init::*;

/// Fixed channel count of every time-series record
pub const CHANNEL_COUNT: usize = 19;

/// Column names `channel_1` .. `channel_19`, in channel order
pub fn channel_columns() -> Vec<String> {
    (1..=CHANNEL_COUNT).map(|i| format!("channel_{}", i)).collect()
}
