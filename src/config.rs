//! Configuration types for Wirecord

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::RecordSpec;
use crate::mapping::MAPPINGS_DIR;
use crate::notifier::Notifier;
use crate::{Result, WirecordError};

/// Default recording root, relative to the crate under test
pub const DEFAULT_RECORDING_LOCATION: &str = "src/test/resources/wiremock";

/// Suite-wide recording configuration, fixed once the suite starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Record data from this URL
    pub target_url: String,
    /// Use this port instead of an ephemeral one
    #[serde(default)]
    pub port: Option<u16>,
    /// Test method names never recorded
    #[serde(default)]
    pub skip_recording_for: BTreeSet<String>,
    /// Save recorded data to this location
    #[serde(default = "default_recording_location")]
    pub recording_location: PathBuf,
    /// Use this notifier instead of the quiet console one
    #[serde(skip)]
    pub notifier: Option<Arc<dyn Notifier>>,
}

fn default_recording_location() -> PathBuf {
    PathBuf::from(DEFAULT_RECORDING_LOCATION)
}

impl RecordingConfig {
    /// Start a builder
    #[must_use]
    pub fn builder() -> RecordingConfigBuilder {
        RecordingConfigBuilder::default()
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WirecordError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| WirecordError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// The recording location is not required to exist; a missing one simply
    /// disables recording.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.target_url.trim().is_empty() {
            return Err(WirecordError::ConfigError(
                "target_url cannot be empty".to_string(),
            ));
        }
        RecordSpec::for_target(&self.target_url).validate()?;

        if self.port == Some(0) {
            return Err(WirecordError::ConfigError(
                "port cannot be 0, omit it for a dynamic port".to_string(),
            ));
        }

        if self.recording_location.as_os_str().is_empty() {
            return Err(WirecordError::ConfigError(
                "recording_location cannot be empty".to_string(),
            ));
        }

        if let Some(name) = self.skip_recording_for.iter().find(|n| n.trim().is_empty()) {
            return Err(WirecordError::ConfigError(format!(
                "skip_recording_for contains a blank name: {name:?}"
            )));
        }

        Ok(())
    }

    /// `{recording_location}/mappings`
    #[must_use]
    pub fn mappings_dir(&self) -> PathBuf {
        self.recording_location.join(MAPPINGS_DIR)
    }
}

/// Builder for [`RecordingConfig`]
#[derive(Debug, Default)]
pub struct RecordingConfigBuilder {
    target_url: Option<String>,
    port: Option<u16>,
    skip_recording_for: BTreeSet<String>,
    recording_location: Option<PathBuf>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl RecordingConfigBuilder {
    /// Record data from this URL
    #[must_use]
    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    /// Fixed port for the mock engine
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Never record these test methods
    #[must_use]
    pub fn skip_recording_for<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_recording_for
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Recording root directory
    #[must_use]
    pub fn recording_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.recording_location = Some(location.into());
        self
    }

    /// Custom notifier
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Finish the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the target URL is missing or validation fails
    pub fn build(self) -> Result<RecordingConfig> {
        let target_url = self
            .target_url
            .ok_or_else(|| WirecordError::ConfigError("target_url is required".to_string()))?;

        let config = RecordingConfig {
            target_url,
            port: self.port,
            skip_recording_for: self.skip_recording_for,
            recording_location: self
                .recording_location
                .unwrap_or_else(default_recording_location),
            notifier: self.notifier,
        };

        config.validate()?;
        Ok(config)
    }
}
