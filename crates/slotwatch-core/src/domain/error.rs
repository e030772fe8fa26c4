//! Error taxonomy for the monitoring loop.

use serde::{Deserialize, Serialize};

/// Coarse classification of what went wrong in a cycle.
///
/// `TransportFailure` and `Inconclusive` never escape the acquisition layer
/// as errors; they only show up here, attached to a [`crate::CycleOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportFailure,
    Inconclusive,
    NotifyFailure,
    ConfigurationInvalid,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::Inconclusive => "inconclusive",
            ErrorKind::NotifyFailure => "notify_failure",
            ErrorKind::ConfigurationInvalid => "configuration_invalid",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the fetch capability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("server error: HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),
}

/// Failure of the notify capability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier transport error: {0}")]
    Transport(String),

    #[error("notifier rejected message (status {status}): {description}")]
    Rejected { status: u16, description: String },
}

/// slotwatch errors surfaced to callers of the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SlotwatchError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("notifier is not reachable")]
    NotifierUnreachable,

    #[error("scheduler is {0}, expected stopped")]
    InvalidState(String),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl SlotwatchError {
    /// Map onto the cycle-level taxonomy where one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SlotwatchError::ConfigurationInvalid(_) => Some(ErrorKind::ConfigurationInvalid),
            SlotwatchError::Notify(_) | SlotwatchError::NotifierUnreachable => {
                Some(ErrorKind::NotifyFailure)
            }
            SlotwatchError::InvalidState(_) => None,
        }
    }
}

/// Result type for slotwatch operations.
pub type Result<T> = std::result::Result<T, SlotwatchError>;
