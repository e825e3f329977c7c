//! Streaming lifecycle events
//!
//! A run produces exactly one `Hello`, then any number of `Tick` and
//! `Reconnected` events, then exactly one terminal event (`Done` or
//! `Error`). Nothing is delivered after the terminal event.

use serde::{Deserialize, Serialize};

use crate::error::ErrorDescriptor;
use crate::report::{Report, ReviewState};

/// Transport diagnostics reported with a completed run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Stream resumes performed
    #[serde(default)]
    pub resumes: u32,
    /// Events trimmed by the backend buffer
    #[serde(default)]
    pub trims: u32,
    /// Events replayed after a resume
    #[serde(default)]
    pub recovered_events: u32,
    /// Backend correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Payload of a `Done` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompletion {
    /// Final report
    pub report: Report,
    /// Optional transport diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<RunDiagnostics>,
    /// Backend ran in degraded mode
    #[serde(default)]
    pub degraded: bool,
    /// Decision review outcome
    pub review: ReviewState,
}

impl RunCompletion {
    /// Completion with no diagnostics and an empty review
    #[must_use]
    pub fn plain(report: Report) -> Self {
        Self {
            report,
            diagnostics: None,
            degraded: false,
            review: ReviewState::Empty,
        }
    }
}

/// One lifecycle event of a streaming run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Run accepted; correlates subsequent events
    Hello {
        /// Backend response id
        response_id: String,
    },
    /// Progress tick, 1-based
    Tick {
        /// Tick index
        index: u32,
    },
    /// Transport resumed after a drop
    Reconnected {
        /// Resume attempt number, 1-based
        attempt: u32,
    },
    /// Terminal success
    Done(Box<RunCompletion>),
    /// Terminal failure
    Error(ErrorDescriptor),
}

impl StreamEvent {
    /// True for `Done` and `Error`
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }

    /// Event name as used on the wire
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Tick { .. } => "tick",
            Self::Reconnected { .. } => "reconnected",
            Self::Done(_) => "done",
            Self::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn terminal_classification() {
        assert!(!StreamEvent::Hello { response_id: "r".into() }.is_terminal());
        assert!(!StreamEvent::Tick { index: 1 }.is_terminal());
        assert!(StreamEvent::Error(ErrorDescriptor::new(ErrorCode::ServerError, "x")).is_terminal());
    }

    #[test]
    fn tagged_wire_shape() {
        let json = serde_json::to_value(StreamEvent::Tick { index: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "tick", "index": 3}));

        let err = StreamEvent::Error(ErrorDescriptor::bad_input("nope"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "BAD_INPUT");
    }
}
