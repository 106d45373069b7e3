//! Error types for Replaydeck

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for Replaydeck operations
pub type Result<T> = std::result::Result<T, DeckError>;

/// Errors that can occur in Replaydeck
#[derive(Debug, Error)]
pub enum DeckError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Cassette serialization error
    #[error("Cassette serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to persist the cassette file; the triggering capture is lost
    #[error("Failed to persist cassette to {path}: {source}")]
    Persist {
        /// Cassette file path
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Transport failure while forwarding to the live backend
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// Live backend returned something that is not a usable HTTP response
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Live backend returned no body
    #[error("Upstream response had no body")]
    EmptyBody,

    /// Inbound request could not be normalized
    #[error("Invalid inbound request: {0}")]
    InvalidRequest(String),

    /// Every candidate port in the fixture range was taken
    #[error("No available port in range {first}..={last}")]
    NoAvailablePort {
        /// First candidate port
        first: u16,
        /// Last candidate port
        last: u16,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
