//! Guards for the report output path.
//!
//! The report is written over whatever is at the path, so it must never
//! point at one of the input snapshots.

use anyhow::{bail, Result};
use std::path::Path;

/// Validates that a report path is safe to overwrite.
///
/// Checks:
/// - Output must have a `.json` extension
/// - Output cannot be the same as any of the input paths
/// - Output cannot be an existing directory
pub fn validate_report_path(output: &Path, source_paths: &[&Path]) -> Result<()> {
    let is_json = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        bail!(
            "Safety check failed: report '{}' must have a .json extension",
            output.display()
        );
    }

    if output.is_dir() {
        bail!(
            "Safety check failed: report '{}' is a directory",
            output.display()
        );
    }

    for source in source_paths {
        if same_file(output, source) {
            bail!(
                "Safety check failed: report '{}' cannot be the same as input '{}'",
                output.display(),
                source.display()
            );
        }
    }

    Ok(())
}

/// Path equality, resolving both sides when they exist.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
