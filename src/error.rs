//! Error types for Pennyworth

use std::io;

use thiserror::Error;

/// Result type alias for Pennyworth
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors: configuration, discovery, storage.
///
/// Authentication outcomes have their own error types next to the component
/// that produces them (see [`crate::auth::VerifyError`],
/// [`crate::login::LoginError`], [`crate::exchange::ExchangeError`]).
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An upstream the core depends on did not answer in time
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a missing required configuration field.
    pub fn missing(field: &str) -> Self {
        Self::Config(format!("missing required setting `{field}`"))
    }

    /// Whether this error should be reported as a configuration problem
    /// (exit code 2 in the CLI) rather than an authentication outcome.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
