//! Error types for Fixtape

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Fixtape operations
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Errors that can occur while intercepting, recording or replaying a request
#[derive(Debug, Error)]
pub enum RecorderError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Fixture (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No fixture stored at the computed address
    #[error("Expected fixture for {method} {href} at {}", path.display())]
    MissingFixture {
        /// Request method
        method: String,
        /// Normalized request href
        href: String,
        /// Path the fixture was looked up at
        path: PathBuf,
    },

    /// Identify callback returned an unusable result
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Hostname or pathname could not be resolved from the request
    #[error("Cannot resolve href {href:?}: {reason}")]
    InvalidHref {
        /// Offending href or URI
        href: String,
        /// What could not be resolved
        reason: String,
    },

    /// Real network call failed
    #[error("Network error: {0}")]
    Network(#[source] hyper_util::client::legacy::Error),

    /// Real network call did not complete in time
    #[error("Request to {href} timed out after {timeout_ms}ms")]
    Timeout {
        /// Target href
        href: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Body could not be captured, encoded or decoded
    #[error("Body error: {0}")]
    Body(String),

    /// Request or response could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl RecorderError {
    /// Whether this error reports a fixture miss in replay mode
    #[must_use]
    pub fn is_missing_fixture(&self) -> bool {
        matches!(self, Self::MissingFixture { .. })
    }
}
