use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum CallError {
    /// Capture or enumeration failure (permission denied, no device, device busy)
    #[error("Device access error: {0}")]
    DeviceAccess(String),

    /// Invalid state transition or malformed description
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Signaling message that does not apply to the current state
    #[error("Stale signal: {0}")]
    StaleSignal(String),

    /// ICE reached the failed state
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Track {0} is already attached to another session")]
    TrackInUse(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error category reported to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DeviceAccess,
    Negotiation,
    StaleSignal,
    ConnectionFailure,
    Signaling,
    Config,
    Internal,
}

impl CallError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::DeviceAccess(_) => ErrorKind::DeviceAccess,
            CallError::Negotiation(_) | CallError::TrackInUse(_) => ErrorKind::Negotiation,
            CallError::StaleSignal(_) => ErrorKind::StaleSignal,
            CallError::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            CallError::Signaling(_) | CallError::Serialization(_) => ErrorKind::Signaling,
            CallError::Config(_) => ErrorKind::Config,
            CallError::Internal(_) | CallError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error only means a message was dropped
    pub fn is_stale(&self) -> bool {
        matches!(self, CallError::StaleSignal(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CallError>;
