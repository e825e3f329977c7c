//! Error types for adapter construction
//!
//! Per-call failures travel as [`ErrorDescriptor`] values; `EngineError`
//! covers the setup paths that happen before any call is made.

use canvas_model::{ErrorCode, ErrorDescriptor};

/// Errors raised while building adapters
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Base URL is not an absolute http(s) URL
    #[error("invalid base url: '{0}'")]
    InvalidBaseUrl(String),

    /// Live preference without a base URL
    #[error("live adapter requested but no base url configured")]
    MissingBaseUrl,

    /// HTTP client construction failed
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<EngineError> for ErrorDescriptor {
    fn from(err: EngineError) -> Self {
        ErrorDescriptor::new(ErrorCode::Network, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_network_descriptor() {
        let desc: ErrorDescriptor = EngineError::InvalidBaseUrl("ftp://x".into()).into();
        assert_eq!(desc.code, ErrorCode::Network);
        assert!(desc.message.contains("ftp://x"));
    }
}
