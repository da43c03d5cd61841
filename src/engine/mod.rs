//! Embedded HTTP mock engine
//!
//! [`MockEngine`] is the capability the recording lifecycle drives: boot,
//! passthrough recording, stub edits and shutdown. [`HttpMockEngine`] is the
//! hyper-based implementation shipped with the crate.

mod recorder;
mod server;
mod stubs;
mod template;

pub use recorder::{
    to_mapping, CapturedExchange, RecordSpec, RecordingSession, DEFAULT_BINARY_BODY_THRESHOLD,
    DEFAULT_TEXT_BODY_THRESHOLD,
};
pub use server::HttpMockEngine;
pub use stubs::{stub_response, IncomingRequest, StubStore};
pub use template::render_template;

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

use crate::mapping::{self, MappingRecord, FILES_DIR, MAPPINGS_DIR};
use crate::notifier::{ConsoleNotifier, Notifier};
use crate::Result;

/// Engine boot configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root holding `mappings/` and `__files/`
    pub root_dir: PathBuf,
    /// Fixed port, or an ephemeral one when `None`
    pub port: Option<u16>,
    /// Interface to bind
    pub bind_address: IpAddr,
    /// Receives recording start/stop notifications
    pub notifier: Arc<dyn Notifier>,
    /// Apply `response-template` transformers
    pub response_templating: bool,
}

impl EngineConfig {
    /// Configuration for a root directory, dynamic port, quiet notifier
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            port: None,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            notifier: Arc::new(ConsoleNotifier::new(false)),
            response_templating: false,
        }
    }

    /// Use a fixed port
    #[must_use]
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Use a custom notifier
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Enable or disable response templating
    #[must_use]
    pub fn with_response_templating(mut self, enabled: bool) -> Self {
        self.response_templating = enabled;
        self
    }

    /// `{root}/mappings`
    #[must_use]
    pub fn mappings_dir(&self) -> PathBuf {
        self.root_dir.join(MAPPINGS_DIR)
    }

    /// `{root}/__files`
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.root_dir.join(FILES_DIR)
    }
}

/// An HTTP mocking engine capable of passthrough recording and stub replay.
///
/// Calls are expected one at a time from the owning test suite.
#[allow(async_fn_in_trait)]
pub trait MockEngine: Sized {
    /// Boot the engine
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot start
    async fn start(config: EngineConfig) -> Result<Self>;

    /// Shut the engine down; a no-op when already stopped
    async fn stop(&self);

    /// Whether the engine is serving requests
    fn is_running(&self) -> bool;

    /// `http://host:port` of the engine
    fn base_url(&self) -> String;

    /// Begin forwarding and capturing traffic
    ///
    /// # Errors
    ///
    /// Returns error if a recording is already open or the spec is invalid
    async fn start_recording(&self, spec: RecordSpec) -> Result<()>;

    /// Stop capturing and return the new stubs in capture order
    ///
    /// # Errors
    ///
    /// Returns error if no recording is open
    async fn stop_recording(&self) -> Result<Vec<MappingRecord>>;

    /// Replace a stub, rewriting its file when persistent
    ///
    /// # Errors
    ///
    /// Returns error if the stub is unknown or cannot be written
    async fn edit_stub_mapping(&self, record: &MappingRecord) -> Result<()>;

    /// File name the engine persists `record` under
    fn safe_file_name(&self, record: &MappingRecord) -> String {
        mapping::safe_file_name(record)
    }
}
