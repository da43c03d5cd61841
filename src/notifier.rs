//! Notification sink used by the mock engine

use std::fmt;

use tracing::{error, info};

/// Receives the engine's user-facing notifications.
///
/// The engine calls `info` exactly once when a recording starts and once when
/// it stops. Everything else goes through `tracing`.
pub trait Notifier: Send + Sync {
    /// Informational message
    fn info(&self, message: &str);

    /// Error message
    fn error(&self, message: &str);
}

/// Default notifier writing through `tracing`.
///
/// In non-verbose mode only errors are emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier {
    verbose: bool,
}

impl ConsoleNotifier {
    /// Create a console notifier
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Whether info messages are emitted
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

impl Notifier for ConsoleNotifier {
    fn info(&self, message: &str) {
        if self.verbose {
            info!(target: "wirecord::notifier", "{message}");
        }
    }

    fn error(&self, message: &str) {
        error!(target: "wirecord::notifier", "{message}");
    }
}

impl fmt::Debug for dyn Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Notifier")
    }
}
