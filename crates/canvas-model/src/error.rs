//! Error descriptors surfaced by analysis backends
//!
//! [`ErrorDescriptor`] is the wire-level error for both terminal stream
//! errors and synchronous rejects. It is a value, not a panic: every failure
//! inside the run core resolves to one of these.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Machine-readable error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request rejected as malformed or structurally invalid
    BadInput,
    /// Too many requests; see `retry_after`
    RateLimited,
    /// Graph exceeds engine capacity
    LimitExceeded,
    /// Backend failure
    ServerError,
    /// Decision review subsystem temporarily unavailable
    CeeTemporary,
    /// Transport failure (connect, reset, decode)
    Network,
    /// Deadline elapsed
    Timeout,
}

impl ErrorCode {
    /// Wire name of the code
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadInput => "BAD_INPUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::ServerError => "SERVER_ERROR",
            Self::CeeTemporary => "CEE_TEMPORARY",
            Self::Network => "NETWORK",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Transport-class codes (network or timeout)
    #[inline]
    #[must_use]
    pub fn is_transport(self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by an analysis backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ErrorDescriptor {
    /// Taxonomy code
    pub code: ErrorCode,
    /// Human message from the backend
    pub message: String,
    /// Seconds to wait before retrying (rate-limit class)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u32>,
    /// Offending fields for input errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl ErrorDescriptor {
    /// Create a descriptor with no retry hint or fields
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after: None,
            fields: Vec::new(),
        }
    }

    /// Attach a retry-after hint in seconds
    #[must_use]
    pub fn with_retry_after(mut self, seconds: u32) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Attach offending field names
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Shorthand for a `BAD_INPUT` descriptor
    #[must_use]
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadInput, message)
    }

    /// Shorthand for a `NETWORK` descriptor
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    /// Shorthand for a `TIMEOUT` descriptor
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Shorthand for a `SERVER_ERROR` descriptor
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }
}
