//! Error taxonomy for the sync pipeline.
//!
//! Source handler failures never surface to HTTP clients directly; the
//! coordinator records them in `SyncStatus` and keeps serving the last
//! good snapshot. They still need distinct kinds so the status message
//! and the retry behavior stay meaningful.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by source handlers and the validator.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source configuration is unusable (bad ref selector, traversal
    /// path, missing endpoint). Fatal at startup, 400 on config endpoints.
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),

    /// Network or filesystem failure while fetching source bytes.
    #[error("fetch failed: {0}")]
    Io(String),

    /// Neither the native nor the upstream probe accepted the endpoint.
    #[error("format detection failed: {0}")]
    FormatDetectionFailed(String),

    /// The response body exceeds the hard size cap.
    #[error("response too large: {size} bytes exceeds cap of {limit} bytes")]
    ResponseTooLarge { size: u64, limit: u64 },

    /// The fetch did not complete within the handler's deadline.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The cancellation token fired mid-fetch.
    #[error("fetch cancelled")]
    Cancelled,

    /// The operation exists at the boundary but this source cannot do it.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The fetched bytes do not parse into a valid registry.
    #[error("registry validation failed: {0}")]
    Validation(String),
}

impl SourceError {
    /// One-line summary for `SyncStatus.message`.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest folds the configured client timeout into the error;
            // the concrete duration is reported by the caller when known.
            SourceError::Timeout(Duration::from_secs(0))
        } else {
            SourceError::Io(err.to_string())
        }
    }
}

impl From<git2::Error> for SourceError {
    fn from(err: git2::Error) -> Self {
        SourceError::Io(format!("git: {}", err.message()))
    }
}
