use thiserror::Error;

use crate::domain::ErrorKind;

/// Error observed by the caller of `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The operation failed terminally or ran out of retries.
    #[error("operation failed after {attempts} attempt(s): {message}")]
    Failed {
        attempts: u32,
        kind: ErrorKind,
        message: String,
    },

    #[error("request cleared by administrator")]
    Cleared,

    #[error("daily request limit of {limit} reached")]
    DailyLimitExceeded { limit: u32 },

    #[error("queue is shutting down, not accepting new requests")]
    ShutdownInProgress,

    /// The queue went away before settling the request.
    #[error("request abandoned before it settled")]
    Abandoned,
}

impl QueueError {
    /// Number of attempts made, for `Failed`.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            QueueError::Failed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Kind of the last operation error, for `Failed`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            QueueError::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Invalid queue construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("event capacity must be greater than zero")]
    ZeroEventCapacity,

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// Malformed configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected an unsigned integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}
