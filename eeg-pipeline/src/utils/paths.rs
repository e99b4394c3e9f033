//! Upload path safety
//!
//! Declared upload names are reduced to a sanitized base name, and every
//! resolved path is checked to stay inside the upload root before any
//! filesystem access.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

/// Longest base name kept from a declared upload name
const MAX_BASE_NAME_LEN: usize = 128;

/// Reduce a declared file name to a safe base name
///
/// Directory parts (either separator) are dropped; characters outside
/// `[A-Za-z0-9._-]` become `_`. Names that reduce to nothing, `.` or `..`
/// are rejected.
pub fn sanitize_base_name(declared: &str) -> PipelineResult<String> {
    if declared.contains('\0') {
        return Err(PipelineError::PathRejected(
            "File name contains a null byte".to_string(),
        ));
    }

    let base = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "." || base == ".." {
        return Err(PipelineError::PathRejected(format!(
            "No usable file name in '{}'",
            declared
        )));
    }

    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_BASE_NAME_LEN)
        .collect();

    // A name of only dots would resolve to the root or its parent
    if sanitized.chars().all(|c| c == '.') {
        return Err(PipelineError::PathRejected(format!(
            "No usable file name in '{}'",
            declared
        )));
    }

    Ok(sanitized)
}

/// Collision-resistant stored name: `{submission nanos}_{base}`
pub fn storage_name(submitted_at: DateTime<Utc>, base: &str) -> String {
    let nanos = submitted_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| submitted_at.timestamp_micros().saturating_mul(1000));
    format!("{}_{}", nanos, base)
}

/// Resolve `candidate` and verify it stays inside `root`
///
/// The root must exist. A candidate that does not exist yet is resolved
/// through its parent directory, which must exist.
pub fn confine_to_root(root: &Path, candidate: &Path) -> PipelineResult<PathBuf> {
    let canonical_root = root.canonicalize().map_err(|e| {
        PipelineError::PathRejected(format!(
            "Upload root cannot be resolved: {} ({})",
            root.display(),
            e
        ))
    })?;

    let resolved = if candidate.exists() {
        candidate.canonicalize()?
    } else {
        let file_name = candidate.file_name().ok_or_else(|| {
            PipelineError::PathRejected(format!("No file name in {}", candidate.display()))
        })?;
        let parent = match candidate.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let canonical_parent = parent.canonicalize().map_err(|e| {
            PipelineError::PathRejected(format!(
                "Parent directory cannot be resolved: {} ({})",
                parent.display(),
                e
            ))
        })?;
        canonical_parent.join(file_name)
    };

    if !resolved.starts_with(&canonical_root) || resolved == canonical_root {
        return Err(PipelineError::PathRejected(format!(
            "{} is outside upload root {}",
            candidate.display(),
            canonical_root.display()
        )));
    }

    Ok(resolved)
}
