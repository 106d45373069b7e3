//! Configuration types for Replaydeck

use std::path::PathBuf;
use std::sync::Arc;

use hyper::Uri;
use serde::{Deserialize, Serialize};

use crate::cassette::Interaction;
use crate::request::InboundRequest;
use crate::{DeckError, Result};

/// Operating mode, switchable at runtime and read at dispatch time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Capture mode: proxy live traffic and record it
    Capture,
    /// Playback mode: serve responses from the cassette
    Playback,
}

impl Mode {
    /// Check if mode is Capture
    #[must_use]
    pub fn is_capture(self) -> bool {
        matches!(self, Mode::Capture)
    }

    /// Check if mode is Playback
    #[must_use]
    pub fn is_playback(self) -> bool {
        matches!(self, Mode::Playback)
    }
}

/// Candidate port range probed at startup
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortRange {
    /// First candidate port (inclusive)
    pub first: u16,
    /// Last candidate port (inclusive)
    pub last: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            first: 6000,
            last: 6100,
        }
    }
}

/// Main fixture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// Initial operating mode
    pub mode: Mode,
    /// Base URL live traffic is proxied toward
    pub base_url: String,
    /// Path of the cassette file
    pub cassette_path: PathBuf,
    /// Candidate listen ports
    #[serde(default)]
    pub ports: PortRange,
}

impl FixtureConfig {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeckError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| DeckError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        let uri = self
            .base_url
            .parse::<Uri>()
            .map_err(|e| DeckError::Config(format!("Invalid base_url: {e}")))?;

        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(DeckError::Config(format!(
                "base_url must carry scheme and host: {}",
                self.base_url
            )));
        }

        if self.cassette_path.as_os_str().is_empty() {
            return Err(DeckError::Config(
                "cassette_path cannot be empty".to_string(),
            ));
        }

        if self.ports.first == 0 || self.ports.first > self.ports.last {
            return Err(DeckError::Config(format!(
                "Invalid port range {}..={}",
                self.ports.first, self.ports.last
            )));
        }

        Ok(())
    }

    /// Parsed base URL
    ///
    /// # Errors
    ///
    /// Returns error if `base_url` does not parse (validate catches this earlier)
    pub fn base_uri(&self) -> Result<Uri> {
        self.base_url
            .parse::<Uri>()
            .map_err(|e| DeckError::Config(format!("Invalid base_url: {e}")))
    }
}

/// Pluggable request matcher: does a stored interaction answer this request?
pub type Matcher = dyn Fn(&Interaction, &InboundRequest) -> bool + Send + Sync;

/// Rewrites or replaces the replayed body bytes
pub type Transformer = dyn Fn(&InboundRequest, Vec<u8>) -> Vec<u8> + Send + Sync;

/// Invoked when playback finds no matching recording
pub type UnrecordedHook = dyn Fn(&InboundRequest) + Send + Sync;

/// Invoked when a capture attempt fails before anything was recorded
pub type CaptureErrorHook = dyn Fn(&DeckError) + Send + Sync;

/// Optional callbacks wired into the pipelines
#[derive(Default, Clone)]
pub struct Hooks {
    /// Custom request matcher; `matcher::approximate` when absent
    pub matcher: Option<Arc<Matcher>>,
    /// Response body transformer applied during playback
    pub transformer: Option<Arc<Transformer>>,
    /// Unrecorded-request callback
    pub on_unrecorded: Option<Arc<UnrecordedHook>>,
    /// Capture-error callback
    pub on_capture_error: Option<Arc<CaptureErrorHook>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("matcher", &self.matcher.is_some())
            .field("transformer", &self.transformer.is_some())
            .field("on_unrecorded", &self.on_unrecorded.is_some())
            .field("on_capture_error", &self.on_capture_error.is_some())
            .finish()
    }
}
