//! Error types for airmenu-core.
//!
//! Two layers of errors exist:
//!
//! - [`Error`] is returned by collaborators (the HTTP client, the settings
//!   store, the client factory). It is never fatal to the engine.
//! - [`PollError`] is what the poller records into the shared state after a
//!   failed fetch. It carries the rendered message shown in the menu and is
//!   cleared by the next successful reading fetch.
//!
//! ## Recovery
//!
//! | Error | Where it surfaces | Recovery |
//! |-------|-------------------|----------|
//! | [`Error::Http`] / [`Error::Status`] | recorded as [`PollError`] | poller retries after 60 s |
//! | [`Error::Token`] | recorded as [`PollError`] | reset credentials |
//! | [`Error::NoDevices`] | recorded as [`PollError::Devices`] | poller retries after 60 s |
//! | [`Error::Settings`] | logged by the caller | none, the value is not persisted |
//! | [`Error::ClientBuild`] | logged by the caller | retry the reset |

use thiserror::Error;

/// Errors that can occur while talking to collaborators.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport failure or undecodable body.
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("GET {endpoint} {status}")]
    Status {
        /// Short name of the endpoint that failed.
        endpoint: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// The OAuth token exchange was rejected.
    #[error("token request failed with status {status}")]
    Token {
        /// HTTP status code.
        status: u16,
    },

    /// The response was well-formed JSON but missing the expected payload.
    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse {
        /// Short name of the endpoint.
        endpoint: &'static str,
        /// What was missing.
        message: String,
    },

    /// The account has no registered devices.
    #[error("no devices registered on this account")]
    NoDevices,

    /// Reading or writing persisted settings failed.
    #[error("Settings error: {0}")]
    Settings(String),

    /// Constructing a data source client failed.
    #[error("Failed to build client: {0}")]
    ClientBuild(String),

    /// A configured URL is not usable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias using airmenu-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed fetch, as recorded in the shared state.
///
/// Transport failures and application-level non-success responses are not
/// distinguished; only the step that failed is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// Fetching the device list failed.
    #[error("error getting devices: {0}")]
    Devices(String),

    /// Fetching the latest reading failed.
    #[error("error getting data: {0}")]
    Reading(String),
}

impl PollError {
    /// Record a device-list failure.
    pub fn devices(err: &Error) -> Self {
        PollError::Devices(err.to_string())
    }

    /// Record a reading failure.
    pub fn reading(err: &Error) -> Self {
        PollError::Reading(err.to_string())
    }
}
