//! Run requests and seeds

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::hash::{ContentHash, HashError};

/// Determinism source for a run
///
/// Controls every pseudo-random decision a mock run makes; the same seed
/// always yields the same observable event sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(pub u64);

impl Seed {
    /// Seed used when neither request nor template supplies one
    pub const DEFAULT: Seed = Seed(1337);

    /// Raw value
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Next seed; a forced re-run uses it to manufacture a new request hash
    #[inline]
    #[must_use]
    pub const fn bumped(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl Default for Seed {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for Seed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// What to analyse and with which determinism source
///
/// Constructed per user action and consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Template to analyse
    pub template_id: String,
    /// Determinism source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<Seed>,
    /// Graph to analyse instead of the template's own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<Graph>,
}

impl RunRequest {
    /// Request for a template with no seed or graph
    #[must_use]
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            seed: None,
            graph: None,
        }
    }

    /// Set the seed
    #[must_use]
    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Set the graph snapshot
    #[must_use]
    pub fn with_graph(mut self, graph: Graph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Content hash of the request; identical requests share it
    ///
    /// # Errors
    /// Returns error if the request cannot be serialized
    pub fn content_hash(&self) -> Result<ContentHash, HashError> {
        ContentHash::of_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::graph::{Node, NodeKind};

    #[test]
    fn bumped_seed_changes_hash() {
        let base = RunRequest::new("pricing-v1").with_seed(41u64);
        let bumped = RunRequest {
            seed: base.seed.map(Seed::bumped),
            ..base.clone()
        };
        assert_eq!(bumped.seed, Some(Seed(42)));
        assert_ne!(base.content_hash().unwrap(), bumped.content_hash().unwrap());
    }

    #[test]
    fn identical_requests_share_hash() {
        let graph = Graph::new(vec![Node::new("a", NodeKind::Decision, "Price")], vec![]);
        let a = RunRequest::new("pricing-v1").with_seed(7u64).with_graph(graph.clone());
        let b = RunRequest::new("pricing-v1").with_seed(7u64).with_graph(graph);
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn seed_serializes_transparently() {
        let json = serde_json::to_value(RunRequest::new("t").with_seed(5u64)).unwrap();
        assert_eq!(json["seed"], 5);
        assert!(json.get("graph").is_none());
    }

    proptest! {
        #[test]
        fn bumped_seed_always_differs(raw in any::<u64>()) {
            let seed = Seed(raw);
            prop_assert_ne!(seed.bumped(), seed);
            prop_assert_eq!(seed.bumped().0, raw.wrapping_add(1));
        }
    }
}
