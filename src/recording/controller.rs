//! Per-test recording state machine

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info};

use super::finalizer::{finalize_recording, FinalizeReport};
use super::inspector::is_recording_required;
use crate::context::TestContext;
use crate::engine::{MockEngine, RecordSpec};
use crate::{Result, WirecordError};

/// Where the controller is in the current test case
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordingState {
    /// Requests are served from existing stubs
    #[default]
    Idle,
    /// Requests are forwarded to the target and captured
    Recording {
        /// Test method being recorded
        test_method: String,
    },
}

/// Enables passthrough recording for tests that have none yet
#[derive(Debug)]
pub struct RecordingController {
    target_url: String,
    mappings_dir: PathBuf,
    skip: BTreeSet<String>,
    state: RecordingState,
}

impl RecordingController {
    /// Create an idle controller
    #[must_use]
    pub fn new(target_url: impl Into<String>, mappings_dir: PathBuf, skip: BTreeSet<String>) -> Self {
        Self {
            target_url: target_url.into(),
            mappings_dir,
            skip,
            state: RecordingState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &RecordingState {
        &self.state
    }

    /// Whether a recording is open
    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecordingState::Recording { .. })
    }

    /// Spec handed to the engine: persistent stubs, bodies always inline
    #[must_use]
    pub fn record_spec(&self) -> RecordSpec {
        RecordSpec::for_target(&self.target_url)
            .make_stubs_persistent(true)
            .extract_text_bodies_over(u64::MAX)
            .extract_binary_bodies_over(u64::MAX)
    }

    /// Case start: record if the test has no mapping yet
    ///
    /// # Errors
    ///
    /// Returns error if a recording is still open or the engine refuses to record
    pub async fn on_case_start<E: MockEngine>(
        &mut self,
        engine: &E,
        test_method: &str,
    ) -> Result<&RecordingState> {
        if let RecordingState::Recording { test_method } = &self.state {
            return Err(WirecordError::AlreadyRecording(Some(test_method.clone())));
        }

        if is_recording_required(test_method, &self.mappings_dir, &self.skip) {
            engine.start_recording(self.record_spec()).await?;
            info!("Recording {test_method} from {}", self.target_url);
            self.state = RecordingState::Recording {
                test_method: test_method.to_string(),
            };
        } else {
            debug!("Replaying {test_method} from existing mappings");
        }

        Ok(&self.state)
    }

    /// Case end: persist what was recorded, back to idle
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot stop the recording
    pub async fn on_case_end<E: MockEngine>(
        &mut self,
        engine: &E,
        context: &TestContext,
    ) -> Result<Option<FinalizeReport>> {
        let RecordingState::Recording { test_method } = std::mem::take(&mut self.state) else {
            return Ok(None);
        };

        let report = finalize_recording(engine, context, &test_method, &self.mappings_dir).await?;
        Ok(Some(report))
    }
}
