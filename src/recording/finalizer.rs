//! Stamps captured stubs with provenance and moves them to test-scoped names

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, error, warn};

use super::inspector::recording_prefix;
use crate::context::TestContext;
use crate::engine::MockEngine;
use crate::mapping::prefixed_file_name;
use crate::Result;

/// Outcome of moving one captured file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResult {
    /// Renamed into place
    Moved,
    /// Left where it was
    Failed(String),
}

/// One file handled by the finalizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// Name the engine wrote
    pub source: String,
    /// Test-scoped name
    pub target: String,
    /// What happened
    pub result: MoveResult,
}

/// Per-case result of a finalize pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    /// Test method the files belong to
    pub test_method: String,
    /// One entry per captured stub, in capture order
    pub outcomes: Vec<FileOutcome>,
}

impl FinalizeReport {
    /// Files renamed into place
    #[must_use]
    pub fn moved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result == MoveResult::Moved)
            .count()
    }

    /// Files that could not be moved
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, MoveResult::Failed(_)))
    }

    /// Nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl fmt::Display for FinalizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} captured, {} moved",
            self.test_method,
            self.outcomes.len(),
            self.moved()
        )
    }
}

/// Stop the engine's capture and persist it under `{test_method}-{safe name}`.
///
/// Metadata and rename failures are logged per stub and never abort the
/// batch.
///
/// # Errors
///
/// Returns error only if the engine cannot stop the recording
pub async fn finalize_recording<E: MockEngine>(
    engine: &E,
    context: &TestContext,
    test_method: &str,
    mappings_dir: &Path,
) -> Result<FinalizeReport> {
    let captured = engine.stop_recording().await?;
    let metadata = context.provenance();

    let mut file_names = Vec::with_capacity(captured.len());
    for mut record in captured {
        record.metadata.clone_from(&metadata);
        if let Err(e) = engine.edit_stub_mapping(&record).await {
            warn!("Could not update metadata of stub {}: {e}", record.id);
        }
        file_names.push(engine.safe_file_name(&record));
    }

    let outcomes = move_mappings(test_method, &file_names, mappings_dir);
    let report = FinalizeReport {
        test_method: test_method.to_string(),
        outcomes,
    };
    debug!("Finalized recording {report}");
    Ok(report)
}

/// Rename each of `files` to `{test_method}-{file}` inside `mappings_dir`.
///
/// Long stems are shortened so the new name stays a valid file name.
#[must_use]
pub fn move_mappings(test_method: &str, files: &[String], mappings_dir: &Path) -> Vec<FileOutcome> {
    let prefix = recording_prefix(test_method);

    files
        .iter()
        .map(|file| {
            let target = prefixed_file_name(&prefix, file);
            let result = match move_one(&mappings_dir.join(file), &mappings_dir.join(&target)) {
                Ok(()) => MoveResult::Moved,
                Err(reason) => {
                    error!("Cannot move: {file}: {reason}");
                    MoveResult::Failed(reason)
                }
            };
            FileOutcome {
                source: file.clone(),
                target,
                result,
            }
        })
        .collect()
}

fn move_one(source: &Path, target: &Path) -> std::result::Result<(), String> {
    // rename() would silently replace an existing target
    if target.exists() {
        return Err(format!("{} already exists", target.display()));
    }
    fs::rename(source, target).map_err(|e| e.to_string())
}
