//! Binds recording to a test suite's lifecycle

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::RecordingConfig;
use crate::context::TestContext;
use crate::engine::{EngineConfig, HttpMockEngine, MockEngine};
use crate::notifier::{ConsoleNotifier, Notifier};
use crate::recording::{FinalizeReport, RecordingController, RecordingState};
use crate::Result;

/// Owns the mock engine for one suite and records tests on their first run.
///
/// Call [`before_all`](Self::before_all) once, wrap every test in
/// [`before_each`](Self::before_each)/[`after_each`](Self::after_each), and
/// finish with [`after_all`](Self::after_all).
pub struct RecordingExtension<E: MockEngine = HttpMockEngine> {
    config: RecordingConfig,
    controller: RecordingController,
    engine: Option<E>,
    reports: Vec<FinalizeReport>,
}

impl<E: MockEngine> RecordingExtension<E> {
    /// Create the extension; nothing starts until `before_all`
    #[must_use]
    pub fn new(config: RecordingConfig) -> Self {
        let controller = RecordingController::new(
            config.target_url.clone(),
            config.mappings_dir(),
            config.skip_recording_for.clone(),
        );

        Self {
            config,
            controller,
            engine: None,
            reports: Vec::new(),
        }
    }

    /// The engine, once started
    #[must_use]
    pub fn server(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Suite configuration
    #[must_use]
    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Recording state of the current test case
    #[must_use]
    pub fn state(&self) -> &RecordingState {
        self.controller.state()
    }

    /// Finalize reports collected so far in this suite
    #[must_use]
    pub fn reports(&self) -> &[FinalizeReport] {
        &self.reports
    }

    /// Engine configuration derived from the suite configuration
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let notifier: Arc<dyn Notifier> = self
            .config
            .notifier
            .clone()
            .unwrap_or_else(|| Arc::new(ConsoleNotifier::new(false)));

        EngineConfig::new(self.config.recording_location.clone())
            .with_port(self.config.port)
            .with_notifier(notifier)
            .with_response_templating(true)
    }

    /// Suite start: boot the engine
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to boot
    pub async fn before_all(&mut self) -> Result<()> {
        if let Some(previous) = self.engine.take() {
            if previous.is_running() {
                warn!("before_all called twice, restarting the mock engine");
                previous.stop().await;
            }
        }

        let engine = E::start(self.engine_config()).await?;
        info!(
            "Mock engine for {} started at {}",
            self.config.target_url,
            engine.base_url()
        );
        self.engine = Some(engine);
        Ok(())
    }

    /// Suite end: stop the engine if it is still running
    pub async fn after_all(&mut self) {
        self.log_summary();

        match &self.engine {
            Some(engine) if engine.is_running() => engine.stop().await,
            Some(_) => debug!("Mock engine already stopped"),
            None => debug!("Mock engine was never started"),
        }
    }

    /// Test start: enable recording when the test has no mapping yet
    ///
    /// # Errors
    ///
    /// Returns error if the engine refuses to start recording
    pub async fn before_each(&mut self, context: &TestContext) -> Result<()> {
        let Some(test_method) = context.test_method() else {
            return Ok(());
        };
        let Some(engine) = &self.engine else {
            warn!("before_each({test_method}) without a running engine");
            return Ok(());
        };

        self.controller.on_case_start(engine, test_method).await?;
        Ok(())
    }

    /// Test end: persist the recording made for this test, if any
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot stop the recording
    pub async fn after_each(&mut self, context: &TestContext) -> Result<Option<FinalizeReport>> {
        if context.test_method().is_none() {
            return Ok(None);
        }
        let Some(engine) = &self.engine else {
            return Ok(None);
        };

        let report = self.controller.on_case_end(engine, context).await?;
        if let Some(report) = &report {
            self.reports.push(report.clone());
        }
        Ok(report)
    }

    fn log_summary(&self) {
        if self.reports.is_empty() {
            return;
        }

        let moved: usize = self.reports.iter().map(FinalizeReport::moved).sum();
        info!(
            "Recorded {} test(s), {} mapping file(s) written",
            self.reports.len(),
            moved
        );

        for report in &self.reports {
            for failure in report.failures() {
                error!(
                    "{}: {} was not moved to {} ({:?})",
                    report.test_method, failure.source, failure.target, failure.result
                );
            }
        }
    }
}
