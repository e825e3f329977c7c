//! Analysis report types

use serde::{Deserialize, Serialize};

use crate::error::ErrorDescriptor;
use crate::hash::ContentHash;

/// Reproducibility card attached to every report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCard {
    /// Content hash of the analysed request; the dedupe key
    pub response_hash: ContentHash,
    /// Template version the run was materialised from
    pub template_version: String,
}

/// Result ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRanges {
    /// Low-end estimate
    pub conservative: f64,
    /// Central estimate
    pub likely: f64,
    /// High-end estimate
    pub optimistic: f64,
    /// Unit label, e.g. `"USD"` or `"%"`
    pub units: String,
}

/// Confidence bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Wide spread, weak evidence
    Low,
    /// Typical
    Medium,
    /// Narrow spread
    High,
}

/// Confidence descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence {
    /// Bucket
    pub level: ConfidenceLevel,
    /// Short explanation
    pub why: String,
}

/// Direction a driver pushes the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// Raises the outcome
    Up,
    /// Lowers the outcome
    Down,
}

/// Driver strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    /// Minor influence
    Low,
    /// Moderate influence
    Medium,
    /// Dominant influence
    High,
}

/// One driver explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    /// Display label
    pub label: String,
    /// Canvas node the driver maps to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Direction
    pub polarity: Polarity,
    /// Strength
    pub strength: Strength,
}

/// Analysis result
///
/// Immutable once produced; orchestrators share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Backend response id
    pub response_id: String,
    /// Template analysed
    pub template_id: String,
    /// Seed the run used
    pub seed: u64,
    /// Reproducibility card
    pub model_card: ModelCard,
    /// Numeric ranges
    pub results: ResultRanges,
    /// Confidence
    pub confidence: Confidence,
    /// Driver explanations, strongest first
    #[serde(default)]
    pub drivers: Vec<Driver>,
}

impl Report {
    /// Content hash used for dedupe and reproducibility
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.model_card.response_hash
    }
}

/// Payload of a populated decision review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionReview {
    /// One-line summary
    pub summary: String,
    /// Suggested follow-ups
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Decision-review state delivered alongside a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReviewState {
    /// Review produced
    Ready {
        /// Review payload
        review: DecisionReview,
    },
    /// Nothing to review
    Empty,
    /// Review subsystem failed
    Error {
        /// Failure detail
        error: ErrorDescriptor,
    },
}

impl ReviewState {
    /// Short name of the state
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Empty => "empty",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn review_state_is_tagged() {
        let ready = ReviewState::Ready {
            review: DecisionReview {
                summary: "Go".into(),
                recommendations: vec![],
            },
        };
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["status"], "ready");

        let err = ReviewState::Error {
            error: ErrorDescriptor::new(ErrorCode::CeeTemporary, "busy"),
        };
        assert_eq!(err.name(), "error");
        assert_eq!(serde_json::to_value(&ReviewState::Empty).unwrap()["status"], "empty");
    }
}
