//! Delimited multi-channel recording rows
//!
//! Recordings are header-less comma-separated rows of exactly
//! [`CHANNEL_COUNT`] decimal fields. A header line simply fails decimal
//! parsing and is skipped like any other malformed row.

use csv::{ReaderBuilder, StringRecord};
use eeg_common::db::CHANNEL_COUNT;
use std::fs::File;
use std::path::Path;

/// Open a recording for row-by-row reading
///
/// Rows of any width are returned; arity is checked by [`parse_channels`].
pub fn open_reader(path: &Path) -> std::io::Result<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

/// Channel vector of a row, or `None` if the row has the wrong arity or any
/// field is not a finite decimal
pub fn parse_channels(record: &StringRecord) -> Option<[f64; CHANNEL_COUNT]> {
    if record.len() != CHANNEL_COUNT {
        return None;
    }

    let mut channels = [0.0; CHANNEL_COUNT];
    for (slot, field) in channels.iter_mut().zip(record.iter()) {
        let value: f64 = field.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        *slot = value;
    }
    Some(channels)
}

/// Count records without parsing their fields; unreadable records count too
pub fn count_records(path: &Path) -> std::io::Result<u64> {
    let mut reader = open_reader(path)?;
    let mut record = StringRecord::new();
    let mut count = 0u64;
    loop {
        match reader.read_record(&mut record) {
            Ok(true) => count += 1,
            Ok(false) => break,
            Err(e) if e.is_io_error() => {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, e));
            }
            Err(_) => count += 1,
        }
    }
    Ok(count)
}
