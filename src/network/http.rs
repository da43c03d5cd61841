//! HTTP request/response helpers for the engine's server side

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};
use tracing::warn;

use crate::{Result, WirecordError};

/// Largest request body the engine buffers
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Stateless helpers used by the engine's connection service
pub struct HttpHandler;

impl HttpHandler {
    /// Build a response, skipping headers that are not valid HTTP
    #[must_use]
    pub fn create_response(
        status: u16,
        headers: &[(String, String)],
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(body));
        *response.status_mut() =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().append(name, value);
                }
                _ => warn!("Dropping invalid header {name}: {value}"),
            }
        }

        response
    }

    /// Plain-text response
    #[must_use]
    pub fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
        Self::create_response(
            status.as_u16(),
            &[("Content-Type".to_string(), "text/plain".to_string())],
            Bytes::from(body.to_string()),
        )
    }

    /// Response for an engine-side error
    #[must_use]
    pub fn error_response(error: &WirecordError) -> Response<Full<Bytes>> {
        let status = match error {
            WirecordError::StubNotFound(_) => StatusCode::NOT_FOUND,
            WirecordError::Forward(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self::text_response(status, &format!("Error: {error}"))
    }

    /// Path and query of an incoming request
    #[must_use]
    pub fn path_and_query<B>(request: &Request<B>) -> String {
        request
            .uri()
            .path_and_query()
            .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string())
    }

    /// Read request body with size limit
    ///
    /// # Errors
    ///
    /// Returns error if body is too large or read fails
    pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let collected = Limited::new(body, max_size).collect().await.map_err(|e| {
            if e.is::<LengthLimitError>() {
                WirecordError::Other(format!("Body too large: exceeds limit of {max_size} bytes"))
            } else {
                WirecordError::Other(format!("Failed to read body: {e}"))
            }
        })?;

        Ok(collected.to_bytes())
    }
}
