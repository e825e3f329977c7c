//! Engine capacity limits

use serde::{Deserialize, Serialize};

/// Capacity limits advertised by the analysis engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLimits {
    /// Maximum nodes per graph
    pub max_nodes: u32,
    /// Maximum edges per graph
    pub max_edges: u32,
    /// p95 latency budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95_budget_ms: Option<u64>,
}

impl EngineLimits {
    /// Conservative defaults used when live limits are unavailable
    pub const FALLBACK: EngineLimits = EngineLimits {
        max_nodes: 100,
        max_edges: 200,
        p95_budget_ms: None,
    };

    /// Check a graph size against the limits
    ///
    /// Returns the names of the exceeded dimensions.
    #[must_use]
    pub fn exceeded_by(&self, nodes: usize, edges: usize) -> Vec<&'static str> {
        let mut exceeded = Vec::new();
        if nodes > self.max_nodes as usize {
            exceeded.push("nodes");
        }
        if edges > self.max_edges as usize {
            exceeded.push("edges");
        }
        exceeded
    }
}

/// Where a set of limits came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitsSource {
    /// Freshly fetched from the engine
    Live,
    /// Static defaults after the engine could not supply limits
    Fallback,
}

/// Limits with provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsSnapshot {
    /// The limits
    pub limits: EngineLimits,
    /// Provenance
    pub source: LimitsSource,
}

impl LimitsSnapshot {
    /// Live limits
    #[must_use]
    pub fn live(limits: EngineLimits) -> Self {
        Self {
            limits,
            source: LimitsSource::Live,
        }
    }

    /// Fallback defaults
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            limits: EngineLimits::FALLBACK,
            source: LimitsSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceeded_dimensions() {
        let limits = EngineLimits {
            max_nodes: 3,
            max_edges: 2,
            p95_budget_ms: Some(800),
        };
        assert!(limits.exceeded_by(3, 2).is_empty());
        assert_eq!(limits.exceeded_by(4, 2), vec!["nodes"]);
        assert_eq!(limits.exceeded_by(4, 9), vec!["nodes", "edges"]);
    }

    #[test]
    fn fallback_snapshot() {
        let snap = LimitsSnapshot::fallback();
        assert_eq!(snap.source, LimitsSource::Fallback);
        assert_eq!(snap.limits, EngineLimits::FALLBACK);
        assert_eq!(serde_json::to_value(snap.source).unwrap(), "fallback");
    }
}
