//! Error types for airq-core.
//!
//! # Retry classification
//!
//! | Error | Retried | Notes |
//! |-------|---------|-------|
//! | [`Error::Request`] | yes | Connection refused, reset, DNS |
//! | [`Error::Timeout`] | yes | Per-request timeout elapsed |
//! | [`Error::Decode`] | yes | Truncated or non-JSON body |
//! | [`Error::Api`] | 5xx and 429 only | Other statuses are final |
//! | [`Error::RemoteContract`] | no | Payload shape or field is wrong |
//! | [`Error::Store`] | no | Local persistence failed |
//! | [`Error::SiteNotFound`] | no | Import site metadata first |
//! | [`Error::Cancelled`] | no | Shutdown requested |
//! | [`Error::InvalidConfig`] | no | Fix configuration and restart |
//!
//! [`Error::Job`] wraps any of the above with the site, series and phase
//! of the sync job that failed.

use std::fmt;
use std::time::Duration;

use airq_types::Series;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while syncing or analysing sensor data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The request could not be sent or the response not received.
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not valid JSON.
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The remote API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The remote payload did not have the expected shape.
    #[error("Remote contract violation: {0}")]
    RemoteContract(String),

    /// Local store failure.
    #[error("Store error: {0}")]
    Store(#[from] airq_store::Error),

    /// No site with this code has been imported.
    #[error("Site not found: {0}")]
    SiteNotFound(String),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A sync job failed; carries which job and where it stopped.
    #[error("Sync {site_code}:{series} failed while {phase}: {source}")]
    Job {
        site_code: String,
        series: Series,
        phase: JobPhase,
        #[source]
        source: Box<Error>,
    },
}

/// Stage a single (site, series) sync job is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Idle,
    ResolvingCursor,
    Fetching,
    Writing,
    Done,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Idle => "idle",
            JobPhase::ResolvingCursor => "resolving cursor",
            JobPhase::Fetching => "fetching",
            JobPhase::Writing => "writing",
            JobPhase::Done => "done",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a remote contract error.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::RemoteContract(message.into())
    }

    /// Attach job context to an error.
    pub fn in_job(self, site_code: &str, series: Series, phase: JobPhase) -> Self {
        Self::Job {
            site_code: site_code.to_string(),
            series,
            phase,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through any job context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Job { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether a retry might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Request { .. } | Error::Decode { .. } | Error::Timeout { .. } => true,
            Error::Api { status, .. } => *status >= 500 || *status == 429,
            Error::RemoteContract(_)
            | Error::Store(_)
            | Error::SiteNotFound(_)
            | Error::Cancelled
            | Error::InvalidConfig(_) => false,
            Error::Job { source, .. } => source.is_transient(),
        }
    }
}

/// Result type alias using airq-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
