//! Error types for Wirecord

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Result type for Wirecord operations
pub type Result<T> = std::result::Result<T, WirecordError>;

/// Errors that can occur in Wirecord
#[derive(Debug, Error)]
pub enum WirecordError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Mapping (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A mapping file on disk could not be parsed
    #[error("Invalid mapping file {path}: {reason}")]
    InvalidMapping {
        /// Offending file
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// The mock engine could not be started
    #[error("Mock engine failed to start on {addr}: {source}")]
    EngineBoot {
        /// Address the engine tried to bind
        addr: String,
        /// Underlying bind error
        source: io::Error,
    },

    /// Operation needs a running engine
    #[error("Mock engine is not running")]
    EngineNotRunning,

    /// `start_recording` while a session is already open
    #[error("Recording already in progress{}", .0.as_deref().map(|m| format!(" for `{m}`")).unwrap_or_default())]
    AlreadyRecording(Option<String>),

    /// `stop_recording` without an open session
    #[error("No recording in progress")]
    NotRecording,

    /// Recording target is not a usable URL
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidTargetUrl {
        /// URL as configured
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Stub mapping id unknown to the engine
    #[error("Stub mapping not found: {0}")]
    StubNotFound(Uuid),

    /// Passthrough request to the target failed
    #[error("Forwarding failed: {0}")]
    Forward(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
