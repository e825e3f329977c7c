//! User-facing error translation

use canvas_model::{ErrorCode, ErrorDescriptor};
use serde::{Deserialize, Serialize};

/// Error copy shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Short heading
    pub title: String,
    /// What happened
    pub message: String,
    /// What to do next
    pub suggestion: String,
    /// Seconds to wait before retrying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u32>,
    /// Offending fields, for input errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// Translate a descriptor into user-facing copy
#[must_use]
pub fn translate(error: &ErrorDescriptor) -> UserMessage {
    let (title, suggestion) = match error.code {
        ErrorCode::BadInput => (
            "Check your graph",
            "Fix the highlighted items and run again.".to_string(),
        ),
        ErrorCode::RateLimited => (
            "Too many requests",
            match error.retry_after {
                Some(seconds) => format!("Wait {seconds}s and try again."),
                None => "Wait a moment and try again.".to_string(),
            },
        ),
        ErrorCode::LimitExceeded => (
            "Graph too large",
            "Remove some nodes or edges to stay within the engine limits.".to_string(),
        ),
        ErrorCode::ServerError => (
            "Analysis failed",
            "Try again. If it keeps failing, switch to the mock engine.".to_string(),
        ),
        ErrorCode::CeeTemporary => (
            "Review unavailable",
            "The decision review service is busy; try again shortly.".to_string(),
        ),
        ErrorCode::Network => (
            "Cannot reach the analysis engine",
            "Check your connection or the engine URL.".to_string(),
        ),
        ErrorCode::Timeout => (
            "Analysis timed out",
            "Try a smaller graph or run again.".to_string(),
        ),
    };
    UserMessage {
        title: title.to_string(),
        message: error.message.clone(),
        suggestion,
        retry_after: error.retry_after,
        fields: error.fields.clone(),
    }
}
