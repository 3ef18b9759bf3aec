//! Error types for parsing in airmenu-types.

use thiserror::Error;

/// Errors that can occur when parsing AirMenu data values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The string does not name a known metric.
    #[error("Unknown metric: '{0}'")]
    UnknownMetric(String),
}

/// Result type alias using airmenu-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
