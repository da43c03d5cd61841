//! Passthrough recording: session state and conversion of captured traffic

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hyper::Uri;
use tracing::debug;

use super::stubs::IncomingRequest;
use crate::mapping::{safe_name, MappingRecord, RequestPattern, ResponseDefinition};
use crate::network::{is_hop_by_hop, ForwardedResponse};
use crate::{Result, WirecordError};

/// WireMock-compatible default for text bodies
pub const DEFAULT_TEXT_BODY_THRESHOLD: u64 = 10 * 1024;

/// Binary bodies are extracted by default
pub const DEFAULT_BINARY_BODY_THRESHOLD: u64 = 0;

/// What and how to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpec {
    /// Base URL requests are forwarded to
    pub target_url: String,
    /// Mark captured stubs persistent
    pub persistent: bool,
    /// Text bodies larger than this go to `__files`
    pub extract_text_bodies_over: u64,
    /// Binary bodies larger than this go to `__files`
    pub extract_binary_bodies_over: u64,
}

impl RecordSpec {
    /// Spec for a target with default thresholds
    #[must_use]
    pub fn for_target(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            persistent: false,
            extract_text_bodies_over: DEFAULT_TEXT_BODY_THRESHOLD,
            extract_binary_bodies_over: DEFAULT_BINARY_BODY_THRESHOLD,
        }
    }

    /// Set persistence of captured stubs
    #[must_use]
    pub fn make_stubs_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Set the text body extraction threshold
    #[must_use]
    pub fn extract_text_bodies_over(mut self, bytes: u64) -> Self {
        self.extract_text_bodies_over = bytes;
        self
    }

    /// Set the binary body extraction threshold
    #[must_use]
    pub fn extract_binary_bodies_over(mut self, bytes: u64) -> Self {
        self.extract_binary_bodies_over = bytes;
        self
    }

    /// Check the target is an absolute `http://` or `https://` URL
    ///
    /// # Errors
    ///
    /// Returns error if the target cannot be forwarded to
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| WirecordError::InvalidTargetUrl {
            url: self.target_url.clone(),
            reason: reason.to_string(),
        };

        let uri = self
            .target_url
            .parse::<Uri>()
            .map_err(|e| invalid(&e.to_string()))?;

        if !matches!(uri.scheme_str(), Some("http" | "https")) {
            return Err(invalid("expected an http:// or https:// URL"));
        }

        if uri.authority().map_or(true, |a| a.host().is_empty()) {
            return Err(invalid("missing host"));
        }

        Ok(())
    }
}

/// One forwarded request and the target's answer
#[derive(Debug, Clone)]
pub struct CapturedExchange {
    /// Request received by the engine
    pub request: IncomingRequest,
    /// Response returned by the target
    pub response: ForwardedResponse,
}

/// An open recording
#[derive(Debug)]
pub struct RecordingSession {
    spec: RecordSpec,
    captured: Vec<CapturedExchange>,
}

impl RecordingSession {
    /// Open a session
    #[must_use]
    pub fn new(spec: RecordSpec) -> Self {
        Self {
            spec,
            captured: Vec::new(),
        }
    }

    /// Spec the session was opened with
    #[must_use]
    pub fn spec(&self) -> &RecordSpec {
        &self.spec
    }

    /// Append an exchange in capture order
    pub fn capture(&mut self, exchange: CapturedExchange) {
        self.captured.push(exchange);
    }

    /// Number of captured exchanges
    #[must_use]
    pub fn len(&self) -> usize {
        self.captured.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.captured.is_empty()
    }

    /// Close the session
    #[must_use]
    pub fn into_parts(self) -> (RecordSpec, Vec<CapturedExchange>) {
        (self.spec, self.captured)
    }
}

/// Turn a captured exchange into a stub mapping.
///
/// Bodies over the spec's thresholds are written to `files_dir`; if that
/// fails the body stays inline and the error is returned alongside.
pub fn to_mapping(
    exchange: &CapturedExchange,
    spec: &RecordSpec,
    files_dir: &Path,
) -> (MappingRecord, Option<WirecordError>) {
    let request = RequestPattern::new(&exchange.request.method, &exchange.request.url);

    let mut headers = BTreeMap::new();
    for (name, value) in &exchange.response.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        headers
            .entry(name.clone())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }

    let mut response = ResponseDefinition {
        status: exchange.response.status,
        headers,
        ..ResponseDefinition::default()
    };

    let mut record = MappingRecord::new(request, response.clone());
    record.persistent = spec.persistent;

    let body = &exchange.response.body;
    if body.is_empty() {
        record.response = response;
        return (record, None);
    }

    let content_type = exchange.response.header("content-type");
    let text = is_text_content(content_type) && std::str::from_utf8(body).is_ok();
    let threshold = if text {
        spec.extract_text_bodies_over
    } else {
        spec.extract_binary_bodies_over
    };

    let mut failure = None;
    if body.len() as u64 > threshold {
        let file_name = body_file_name(&record, content_type, text);
        match write_body_file(files_dir, &file_name, body) {
            Ok(()) => {
                debug!("Extracted {} byte body to {file_name}", body.len());
                response.body_file_name = Some(file_name);
                record.response = response;
                return (record, None);
            }
            Err(e) => failure = Some(WirecordError::Io(e)),
        }
    }

    if text {
        response.body = Some(String::from_utf8_lossy(body).into_owned());
    } else {
        response.base64_body = Some(STANDARD.encode(body));
    }
    record.response = response;
    (record, failure)
}

fn is_text_content(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime.starts_with("text/")
        || mime.ends_with("json")
        || mime.ends_with("xml")
        || mime.contains("javascript")
        || mime == "application/x-www-form-urlencoded"
}

fn body_file_name(record: &MappingRecord, content_type: Option<&str>, text: bool) -> String {
    let stem = record.request.path().map(|p| safe_name(p.trim_start_matches('/')));
    let extension = match content_type.map(str::to_ascii_lowercase) {
        Some(ct) if ct.contains("json") => "json",
        Some(ct) if ct.contains("html") => "html",
        Some(ct) if ct.contains("xml") => "xml",
        _ if text => "txt",
        _ => "bin",
    };

    match stem.filter(|s| !s.is_empty()) {
        Some(stem) => format!("{stem}-{}.{extension}", record.id),
        None => format!("{}.{extension}", record.id),
    }
}

fn write_body_file(files_dir: &Path, file_name: &str, body: &[u8]) -> io::Result<()> {
    // `__files` may be created, the recording root may not
    match fs::create_dir(files_dir) {
        Err(e) if e.kind() != io::ErrorKind::AlreadyExists => return Err(e),
        _ => {}
    }
    fs::write(files_dir.join(file_name), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exchange(content_type: &str, body: &[u8]) -> CapturedExchange {
        CapturedExchange {
            request: IncomingRequest {
                method: "GET".to_string(),
                url: "/api/items?page=1".to_string(),
                headers: vec![],
                body: vec![],
            },
            response: ForwardedResponse {
                status: 200,
                headers: vec![
                    ("content-type".to_string(), content_type.to_string()),
                    ("content-length".to_string(), body.len().to_string()),
                    ("connection".to_string(), "keep-alive".to_string()),
                    ("set-cookie".to_string(), "a=1".to_string()),
                    ("set-cookie".to_string(), "b=2".to_string()),
                ],
                body: body.to_vec(),
            },
        }
    }

    fn inline_spec() -> RecordSpec {
        RecordSpec::for_target("http://localhost:1")
            .make_stubs_persistent(true)
            .extract_text_bodies_over(u64::MAX)
            .extract_binary_bodies_over(u64::MAX)
    }

    #[test]
    fn test_spec_validation() {
        assert!(RecordSpec::for_target("http://localhost:8080").validate().is_ok());
        assert!(RecordSpec::for_target("http://").validate().is_err());
        assert!(RecordSpec::for_target("https://example.com").validate().is_ok());
        assert!(RecordSpec::for_target("https://").validate().is_err());
        assert!(RecordSpec::for_target("ftp://example.com").validate().is_err());
        assert!(RecordSpec::for_target("localhost:8080").validate().is_err());
        assert!(RecordSpec::for_target("not a url").validate().is_err());
    }

    #[test]
    fn test_text_body_inlined() {
        let dir = TempDir::new().unwrap();
        let (record, failure) = to_mapping(
            &exchange("application/json", b"{\"a\":1}"),
            &inline_spec(),
            &dir.path().join("__files"),
        );

        assert!(failure.is_none());
        assert!(record.persistent);
        assert_eq!(record.request.url.as_deref(), Some("/api/items?page=1"));
        assert_eq!(record.response.body.as_deref(), Some("{\"a\":1}"));
        assert!(record.response.body_file_name.is_none());
        assert!(!record.response.headers.contains_key("content-length"));
        assert!(!record.response.headers.contains_key("connection"));
        assert_eq!(record.response.headers["set-cookie"], "a=1, b=2");
        assert!(!dir.path().join("__files").exists());
    }

    #[test]
    fn test_binary_body_base64() {
        let dir = TempDir::new().unwrap();
        let (record, _) = to_mapping(
            &exchange("image/png", &[0x89, 0x50, 0xff]),
            &inline_spec(),
            dir.path(),
        );

        assert!(record.response.body.is_none());
        assert_eq!(record.response.base64_body.as_deref(), Some("iVD/"));
    }

    #[test]
    fn test_large_body_extracted() {
        let dir = TempDir::new().unwrap();
        let files_dir = dir.path().join("__files");
        let spec = RecordSpec::for_target("http://localhost:1").extract_text_bodies_over(3);

        let (record, failure) = to_mapping(&exchange("text/plain", b"long body"), &spec, &files_dir);

        assert!(failure.is_none());
        let file_name = record.response.body_file_name.clone().unwrap();
        assert_eq!(file_name, format!("api_items-{}.txt", record.id));
        assert_eq!(std::fs::read(files_dir.join(file_name)).unwrap(), b"long body");
        assert!(record.response.body.is_none());
    }

    #[test]
    fn test_extraction_failure_keeps_body_inline() {
        let dir = TempDir::new().unwrap();
        let files_dir = dir.path().join("missing-root").join("__files");
        let spec = RecordSpec::for_target("http://localhost:1").extract_text_bodies_over(0);

        let (record, failure) = to_mapping(&exchange("text/plain", b"body"), &spec, &files_dir);

        assert!(failure.is_some());
        assert_eq!(record.response.body.as_deref(), Some("body"));
        assert!(!dir.path().join("missing-root").exists());
    }

    #[test]
    fn test_session_capture_order() {
        let mut session = RecordingSession::new(inline_spec());
        assert!(session.is_empty());

        session.capture(exchange("text/plain", b"1"));
        session.capture(exchange("text/plain", b"2"));

        let (spec, captured) = session.into_parts();
        assert_eq!(spec, inline_spec());
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[1].response.body, b"2");
    }
}
