//! Stub mapping model and its on-disk representation

mod safe_names;
mod store;

pub use safe_names::{
    prefixed_file_name, safe_file_name, safe_name, MAX_FILE_NAME_LEN, MAX_SAFE_NAME_LEN,
};
pub use store::{load_mappings, write_mapping, MappingFile};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subdirectory of the recording root holding mapping files
pub const MAPPINGS_DIR: &str = "mappings";

/// Subdirectory of the recording root holding extracted bodies
pub const FILES_DIR: &str = "__files";

/// Transformer name that opts a stub into response templating
pub const RESPONSE_TEMPLATE: &str = "response-template";

/// Provenance metadata attached to a mapping
pub type Metadata = BTreeMap<String, String>;

/// A request/response rule, either captured by a recording or loaded from disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRecord {
    /// Unique identifier
    pub id: Uuid,
    /// Optional human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Request matcher
    pub request: RequestPattern,
    /// Response served on match
    pub response: ResponseDefinition,
    /// Mirror of `id`, kept for file compatibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    /// Whether the engine writes this mapping to disk
    #[serde(default)]
    pub persistent: bool,
    /// Provenance metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    /// Insertion order inside the engine
    #[serde(default)]
    pub insertion_index: u64,
}

impl MappingRecord {
    /// Create a mapping with a fresh id
    #[must_use]
    pub fn new(request: RequestPattern, response: ResponseDefinition) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name: None,
            request,
            response,
            uuid: Some(id),
            persistent: false,
            metadata: Metadata::new(),
            insertion_index: 0,
        }
    }

    /// Look up a metadata attribute
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Request matcher: method plus exact URL (path and query)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPattern {
    /// HTTP method, `ANY` matches every method
    #[serde(default = "any_method")]
    pub method: String,
    /// Exact URL including the query string; absent matches any URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn any_method() -> String {
    "ANY".to_string()
}

impl RequestPattern {
    /// Matcher for one method and URL
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: Some(url.into()),
        }
    }

    /// Check a request against this pattern
    #[must_use]
    pub fn matches(&self, method: &str, url: &str) -> bool {
        let method_ok = self.method.eq_ignore_ascii_case("ANY")
            || self.method.eq_ignore_ascii_case(method);
        let url_ok = self.url.as_deref().map_or(true, |expected| expected == url);
        method_ok && url_ok
    }

    /// Path portion of the URL, without query string
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(|url| url.split_once('?').map_or(url, |(path, _)| path))
    }
}

/// Response served by a stub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,
    /// Response headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Inline text body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Inline binary body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_body: Option<String>,
    /// Body stored under `__files`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_file_name: Option<String>,
    /// Response transformers applied when serving
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformers: Vec<String>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: BTreeMap::new(),
            body: None,
            base64_body: None,
            body_file_name: None,
            transformers: Vec::new(),
        }
    }
}

impl ResponseDefinition {
    /// Response with a status and inline text body
    #[must_use]
    pub fn with_body(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Whether the response opts into templating
    #[must_use]
    pub fn is_templated(&self) -> bool {
        self.transformers.iter().any(|t| t == RESPONSE_TEMPLATE)
    }
}
