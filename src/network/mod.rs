//! Network layer for Wirecord
//!
//! Client used for passthrough forwarding plus the server-side helpers the
//! engine's connection service is built from.

mod client;
mod http;

pub use client::{is_hop_by_hop, join_url, ForwardedResponse, HttpClient, OutgoingRequest};
pub use http::{HttpHandler, MAX_BODY_SIZE};

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Headers scoped to a single connection
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];
