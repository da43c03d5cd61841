//! Decides whether a test still needs a recording pass

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, error};

/// Whether `test_method` should be recorded.
///
/// False for skipped methods. Otherwise true iff no entry directly under
/// `mappings_dir` is named `{test_method}-*`. A directory that cannot be
/// listed is reported and treated as "not required".
#[must_use]
pub fn is_recording_required(
    test_method: &str,
    mappings_dir: &Path,
    skip: &BTreeSet<String>,
) -> bool {
    if skip.contains(test_method) {
        debug!("Recording skipped by configuration for {test_method}");
        return false;
    }

    match has_recording(test_method, mappings_dir) {
        Ok(found) => !found,
        Err(e) => {
            error!("Can't check dir {}: {e}", mappings_dir.display());
            false
        }
    }
}

/// Whether a `{test_method}-*` entry exists in `mappings_dir`
///
/// # Errors
///
/// Returns error if the directory or one of its entries cannot be read
pub fn has_recording(test_method: &str, mappings_dir: &Path) -> io::Result<bool> {
    let prefix = recording_prefix(test_method);
    for entry in fs::read_dir(mappings_dir)? {
        if entry?.file_name().to_string_lossy().starts_with(&prefix) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `{test_method}-`, the prefix every recording of a test carries
#[must_use]
pub fn recording_prefix(test_method: &str) -> String {
    format!("{test_method}-")
}
