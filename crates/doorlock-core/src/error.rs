use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification shared by all crates.
///
/// Every crate-level error type maps onto one of these kinds through a
/// `kind()` method. The firmware reacts to kinds, never to concrete error
/// variants: the reaction is always one of a small fixed set (error tone,
/// re-enter a state, reformat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid argument.
    Parameter,
    /// Operation not valid in the current state.
    Request,
    /// Unsupported database version or peripheral path.
    NotSupported,
    /// Corrupt persistent data.
    BadData,
    /// Slot capacity exhausted.
    NoMemory,
    /// Supply voltage dropped during motor actuation.
    VccLow,
    /// A deadline expired.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ErrorKind::Parameter => "parameter",
            ErrorKind::Request => "request",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::BadData => "bad data",
            ErrorKind::NoMemory => "no memory",
            ErrorKind::VccLow => "vcc low",
            ErrorKind::Timeout => "timeout",
        };
        write!(f, "{}", kind)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("UID length must be 1-{max} bytes, got {len}")]
    InvalidUidLength { len: usize, max: usize },

    #[error("Invalid UID format: {0}")]
    InvalidUidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl Error {
    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUidLength { .. } | Error::InvalidUidFormat(_) | Error::Config(_) => {
                ErrorKind::Parameter
            }
            Error::InvalidStateTransition { .. } => ErrorKind::Request,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_length_error_display() {
        let error = Error::InvalidUidLength { len: 11, max: 10 };
        assert_eq!(error.to_string(), "UID length must be 1-10 bytes, got 11");
        assert_eq!(error.kind(), ErrorKind::Parameter);
    }

    #[test]
    fn test_transition_error_is_request_kind() {
        let error = Error::InvalidStateTransition {
            from: "DeepSleep".to_string(),
            to: "WaitProgMode2".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Request);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::BadData.to_string(), "bad data");
        assert_eq!(ErrorKind::VccLow.to_string(), "vcc low");
    }
}
