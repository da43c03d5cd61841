//! Reading and writing mapping files

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::MappingRecord;
use crate::{Result, WirecordError};

/// Contents of one mapping file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MappingFile {
    /// `{"mappings": [...]}`
    Many {
        /// Contained mappings
        mappings: Vec<MappingRecord>,
    },
    /// A single mapping object
    Single(Box<MappingRecord>),
}

impl MappingFile {
    /// Flatten into the contained mappings
    #[must_use]
    pub fn into_records(self) -> Vec<MappingRecord> {
        match self {
            Self::Many { mappings } => mappings,
            Self::Single(record) => vec![*record],
        }
    }
}

/// Load every `*.json` mapping file directly under `dir`, sorted by file name.
///
/// A missing directory yields no mappings.
///
/// # Errors
///
/// Returns error if the directory cannot be listed or a file does not parse
pub fn load_mappings(dir: &Path) -> Result<Vec<(PathBuf, MappingRecord)>> {
    if !dir.is_dir() {
        debug!("No mappings directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = Vec::new();
    for path in paths {
        let content = fs::read_to_string(&path)?;
        let file: MappingFile =
            serde_json::from_str(&content).map_err(|e| WirecordError::InvalidMapping {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        for record in file.into_records() {
            loaded.push((path.clone(), record));
        }
    }

    debug!("Loaded {} mapping(s) from {}", loaded.len(), dir.display());
    Ok(loaded)
}

/// Write `record` as pretty JSON to `dir/file_name`.
///
/// The directory is not created: a missing root means nothing is written.
///
/// # Errors
///
/// Returns error if serialization or the write fails
pub fn write_mapping(dir: &Path, file_name: &str, record: &MappingRecord) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json)?;
    Ok(path)
}
