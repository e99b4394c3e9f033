//! Recording file generators

use eeg_common::db::CHANNEL_COUNT;
use std::path::{Path, PathBuf};

/// One comma-separated row of `width` decimal fields
fn row(index: usize, width: usize) -> String {
    (0..width)
        .map(|c| format!("{:.3}", (index * CHANNEL_COUNT + c) as f64 * 0.01 - 1.0))
        .collect::<Vec<_>>()
        .join(",")
}

/// `rows` well-formed 19-channel rows
pub fn recording_bytes(rows: usize) -> Vec<u8> {
    let mut out = String::new();
    for r in 0..rows {
        out.push_str(&row(r, CHANNEL_COUNT));
        out.push('\n');
    }
    out.into_bytes()
}

/// Write `rows` well-formed 19-channel rows to `dir/name`
pub fn write_recording(dir: &Path, name: &str, rows: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, recording_bytes(rows)).unwrap();
    path
}

/// Write rows with the given field counts to `dir/name`
pub fn write_rows(dir: &Path, name: &str, widths: &[usize]) -> PathBuf {
    let path = dir.join(name);
    let body: String = widths
        .iter()
        .enumerate()
        .map(|(i, w)| format!("{}\n", row(i, *w)))
        .collect();
    std::fs::write(&path, body).unwrap();
    path
}
