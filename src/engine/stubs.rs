//! In-memory stub store and stub responses

use std::fs;
use std::path::{Component, Path};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dashmap::DashMap;
use hyper::body::Bytes;
use uuid::Uuid;

use super::template::render_template;
use crate::mapping::MappingRecord;
use crate::{Result, WirecordError};

/// A request as seen by the engine
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// HTTP method
    pub method: String,
    /// Path and query
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Vec<u8>,
}

impl IncomingRequest {
    /// URL without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(&self.url, |(path, _)| path)
    }

    /// First value of a query parameter, percent-decoded
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let (_, query) = self.url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| {
                urlencoding::decode(value).map_or_else(|_| value.to_string(), |v| v.into_owned())
            })
    }

    /// First header value, case-insensitive
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Stub mappings currently served by the engine
pub struct StubStore {
    stubs: DashMap<Uuid, MappingRecord>,
    next_index: AtomicU64,
}

impl StubStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            stubs: DashMap::new(),
            next_index: AtomicU64::new(0),
        }
    }

    /// Add a stub, assigning its insertion index
    pub fn add(&self, mut record: MappingRecord) -> MappingRecord {
        record.insertion_index = self.next_index.fetch_add(1, Ordering::Relaxed);
        if record.uuid.is_none() {
            record.uuid = Some(record.id);
        }
        self.stubs.insert(record.id, record.clone());
        record
    }

    /// Replace an existing stub, keeping its insertion index
    ///
    /// # Errors
    ///
    /// Returns error if no stub has the record's id
    pub fn replace(&self, record: &MappingRecord) -> Result<MappingRecord> {
        let mut entry = self
            .stubs
            .get_mut(&record.id)
            .ok_or(WirecordError::StubNotFound(record.id))?;

        let insertion_index = entry.insertion_index;
        *entry = record.clone();
        entry.insertion_index = insertion_index;
        Ok(entry.clone())
    }

    /// Most recently added stub matching the request
    #[must_use]
    pub fn find_match(&self, method: &str, url: &str) -> Option<MappingRecord> {
        self.stubs
            .iter()
            .filter(|entry| entry.request.matches(method, url))
            .max_by_key(|entry| entry.insertion_index)
            .map(|entry| entry.value().clone())
    }

    /// All stubs in insertion order
    #[must_use]
    pub fn all(&self) -> Vec<MappingRecord> {
        let mut stubs: Vec<_> = self.stubs.iter().map(|e| e.value().clone()).collect();
        stubs.sort_by_key(|s| s.insertion_index);
        stubs
    }

    /// Number of stubs
    #[must_use]
    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

impl Default for StubStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Status, headers and body a stub produces for `request`
///
/// # Errors
///
/// Returns error if the body file is unreadable or the base64 body is invalid
pub fn stub_response(
    record: &MappingRecord,
    request: &IncomingRequest,
    files_dir: &Path,
    templating: bool,
) -> Result<(u16, Vec<(String, String)>, Bytes)> {
    let response = &record.response;
    let headers: Vec<(String, String)> = response
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let raw: Vec<u8> = if let Some(file_name) = &response.body_file_name {
        if !is_relative_file_name(file_name) {
            return Err(WirecordError::Other(format!(
                "Refusing body file outside {}: {file_name}",
                files_dir.display()
            )));
        }
        fs::read(files_dir.join(file_name))?
    } else if let Some(encoded) = &response.base64_body {
        STANDARD
            .decode(encoded)
            .map_err(|e| WirecordError::Other(format!("Invalid base64 body: {e}")))?
    } else {
        response.body.clone().unwrap_or_default().into_bytes()
    };

    let body = if templating && response.is_templated() {
        match String::from_utf8(raw) {
            Ok(text) => Bytes::from(render_template(&text, request)),
            Err(e) => Bytes::from(e.into_bytes()),
        }
    } else {
        Bytes::from(raw)
    };

    Ok((response.status, headers, body))
}

/// Only plain relative components, so the name resolves inside `__files`
fn is_relative_file_name(file_name: &str) -> bool {
    let path = Path::new(file_name);
    !file_name.is_empty()
        && !path.is_absolute()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}
