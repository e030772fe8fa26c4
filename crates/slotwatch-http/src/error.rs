//! Error types for slotwatch-http

use thiserror::Error;

/// Errors raised while constructing or configuring HTTP collaborators.
///
/// Per-request failures never use this type: they are reported through the
/// core's `FetchError` / `NotifyError` so the scheduler can classify them.
#[derive(Error, Debug)]
pub enum HttpError {
    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Required setting missing
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        HttpError::Client(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;
