//! Recording decision engine
//!
//! The inspector decides whether a test needs recording, the controller turns
//! that verdict into an engine recording, and the finalizer persists the
//! captured stubs under `{test_method}-{safe name}` once the test ends.

mod controller;
mod finalizer;
mod inspector;

pub use controller::{RecordingController, RecordingState};
pub use finalizer::{finalize_recording, move_mappings, FileOutcome, FinalizeReport, MoveResult};
pub use inspector::{has_recording, is_recording_required, recording_prefix};
