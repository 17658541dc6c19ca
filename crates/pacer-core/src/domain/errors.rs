//! Errors - 操作エラーと分類
//!
//! 操作は失敗を `OperationError` で返し、明示的な `ErrorKind` を持つ。
//! キューが見るのは kind だけで、メッセージは診断と拒否メッセージの合成に使う。
//!
//! # 分類
//! - RateLimited / Transient: リトライ対象
//! - Unauthorized / MalformedRequest / Unknown: 即失敗

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed taxonomy of operation failures.
///
/// - `RateLimited`, `Transient`: worth retrying.
/// - `Unauthorized`, `MalformedRequest`, `Unknown`: terminal. Unknown failures
///   are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Unauthorized,
    MalformedRequest,
    Transient,
    Unknown,
}

const UNAUTHORIZED_MARKERS: &[&str] = &["invalid api key", "unauthorized", "401", "403", "forbidden"];
const MALFORMED_MARKERS: &[&str] = &["invalid request", "400"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "quota exceeded"];
const TRANSIENT_MARKERS: &[&str] = &[
    "overloaded",
    "503",
    "service unavailable",
    "timeout",
    "temporarily unavailable",
    "network error",
    "connection error",
];

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Transient)
    }

    /// Classify a free-text provider message.
    ///
    /// Matching is case-insensitive and terminal markers are checked before
    /// retryable ones, so "503 forbidden" is `Unauthorized`.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let contains_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if contains_any(UNAUTHORIZED_MARKERS) {
            ErrorKind::Unauthorized
        } else if contains_any(MALFORMED_MARKERS) {
            ErrorKind::MalformedRequest
        } else if contains_any(RATE_LIMIT_MARKERS) {
            ErrorKind::RateLimited
        } else if contains_any(TRANSIENT_MARKERS) {
            ErrorKind::Transient
        } else {
            ErrorKind::Unknown
        }
    }

    /// Map an HTTP status code returned by a provider.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Unauthorized,
            400 | 404 | 422 => ErrorKind::MalformedRequest,
            429 => ErrorKind::RateLimited,
            408 | 500 | 502 | 503 | 504 => ErrorKind::Transient,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::MalformedRequest => "malformed_request",
            ErrorKind::Transient => "transient",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a single attempt of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct OperationError {
    kind: ErrorKind,
    message: String,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error whose kind is derived from the message text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ErrorKind::classify(&message),
            message,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedRequest, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
