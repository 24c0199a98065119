//! Error types for value parsing in airq-types.

use thiserror::Error;

/// Errors that can occur when parsing or constructing airq values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// A string did not name a known series.
    #[error("Unknown series: {0}")]
    UnknownSeries(String),

    /// A string did not name a known data source.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// A time range was constructed with `start > end`.
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },
}

/// Result type alias using airq-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
