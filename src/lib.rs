//! Wirecord - record-on-first-run HTTP mocking for test suites
//!
//! An embedded mock engine is started for the suite. Each test that has no
//! `mappings/{test}-*` file yet is recorded against the real target; every
//! later run replays the stored mappings.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod extension;
pub mod mapping;
pub mod network;
pub mod notifier;
pub mod recording;

pub use config::RecordingConfig;
pub use context::TestContext;
pub use engine::{HttpMockEngine, MockEngine};
pub use error::{Result, WirecordError};
pub use extension::RecordingExtension;
pub use notifier::{ConsoleNotifier, Notifier};
