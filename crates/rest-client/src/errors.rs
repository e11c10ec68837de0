//! Errors raised while constructing the HTTP backend.
//!
//! Failures of individual calls never surface here; they reach the dispatcher
//! as a `BackendError` through the response callback.

use thiserror::Error;

/// Errors from [`crate::HttpBackend`] construction and URL building.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured instance URL does not parse.
    #[error("invalid instance URL '{url}'")]
    InvalidInstanceUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The instance URL cannot carry a path (e.g. `mailto:`).
    #[error("instance URL '{url}' cannot be used as a base")]
    NotABase { url: String },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Http(#[from] reqwest::Error),
}

/// Failure obtaining an access token.
#[derive(Debug, Error)]
#[error("access token unavailable: {message}")]
pub struct TokenError {
    pub message: String,
}

impl TokenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
