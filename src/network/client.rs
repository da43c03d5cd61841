//! HTTP client for forwarding requests to the recording target

use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::HOP_BY_HOP_HEADERS;
use crate::{Result, WirecordError};

/// HTTP client for forwarding requests, plain or TLS
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HttpClient {
    /// Create a new HTTP client trusting the webpki root certificates
    #[must_use]
    pub fn new() -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Self { client }
    }

    /// Send a request to an absolute URL
    ///
    /// # Errors
    ///
    /// Returns error if the URL or method is invalid or the request fails
    pub async fn send(&self, request: &OutgoingRequest<'_>) -> Result<ForwardedResponse> {
        let uri = request
            .url
            .parse::<Uri>()
            .map_err(|e| WirecordError::Forward(format!("Invalid URI '{}': {e}", request.url)))?;

        debug!("Forwarding {} to {}", request.method, uri);

        let method = request.method.parse::<Method>().map_err(|e| {
            WirecordError::Forward(format!("Invalid HTTP method '{}': {e}", request.method))
        })?;

        let mut request_builder = Request::builder().method(method).uri(uri);

        // Host and length are derived from the target URI and body
        for (name, value) in request.headers {
            if name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("content-length")
                || is_hop_by_hop(name)
            {
                continue;
            }
            request_builder = request_builder.header(name, value);
        }

        let http_request = request_builder
            .body(Full::new(Bytes::copy_from_slice(request.body)))
            .map_err(|e| WirecordError::Forward(format!("Failed to build request: {e}")))?;

        let response = self.client.request(http_request).await.map_err(|e| {
            warn!("Request failed: {e}");
            WirecordError::Forward(format!("Request failed: {e}"))
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("<invalid>").to_string(),
                )
            })
            .collect();

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| WirecordError::Forward(format!("Failed to read response body: {e}")))?
            .to_bytes();

        Ok(ForwardedResponse {
            status,
            headers,
            body: body_bytes.to_vec(),
        })
    }

    /// Convenience `GET` with no headers
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn get(&self, url: &str) -> Result<ForwardedResponse> {
        self.send(&OutgoingRequest {
            method: "GET",
            url,
            headers: &[],
            body: &[],
        })
        .await
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Request to be sent
#[derive(Debug)]
pub struct OutgoingRequest<'a> {
    /// HTTP method
    pub method: &'a str,
    /// Absolute URL
    pub url: &'a str,
    /// Request headers
    pub headers: &'a [(String, String)],
    /// Request body
    pub body: &'a [u8],
}

/// Response from a sent request
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl ForwardedResponse {
    /// First header value with the given name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8, lossy
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 2xx status
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 4xx status
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// Headers that must not be copied between hops
#[must_use]
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Join a target base URL and a request path-and-query
#[must_use]
pub fn join_url(base: &str, path_and_query: &str) -> String {
    let base = base.trim_end_matches('/');
    if path_and_query.starts_with('/') {
        format!("{base}{path_and_query}")
    } else {
        format!("{base}/{path_and_query}")
    }
}
