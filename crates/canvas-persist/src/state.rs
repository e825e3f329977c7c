//! Persisted state shape and schema validation

use canvas_model::{Edge, GraphSource, Node};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sanitize::{sanitize_edge, sanitize_label, sanitize_node};

/// Current persisted schema version
pub const SCHEMA_VERSION: u32 = 1;

/// The only shape ever written to durable storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Schema version
    pub version: u32,
    /// Save time, epoch milliseconds
    pub timestamp: i64,
    /// Committed nodes
    pub nodes: Vec<Node>,
    /// Committed edges
    pub edges: Vec<Edge>,
}

impl PersistedState {
    /// Extract and sanitize the committed graph of `source`
    ///
    /// Only nodes and edges are read; nothing else on the source can reach
    /// the persisted payload.
    #[must_use]
    pub fn capture(source: &(impl GraphSource + ?Sized), timestamp: i64) -> Self {
        Self {
            version: SCHEMA_VERSION,
            timestamp,
            nodes: source.nodes().to_vec(),
            edges: source.edges().to_vec(),
        }
        .sanitized()
    }

    /// Sanitize every label and data payload
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            nodes: self.nodes.into_iter().map(sanitize_node).collect(),
            edges: self.edges.into_iter().map(sanitize_edge).collect(),
            ..self
        }
    }

    /// Parse and validate a raw payload
    ///
    /// Accepts only objects with numeric `version` and `timestamp` and array
    /// `nodes` and `edges`. Anything else is treated as absent.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(value)
    }

    /// Validate an already-parsed payload
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        if !has_valid_shape(&value) {
            return None;
        }
        match serde_json::from_value::<Self>(value) {
            Ok(state) => Some(state.sanitized()),
            Err(err) => {
                tracing::debug!("rejecting persisted payload: {err}");
                None
            }
        }
    }
}

impl GraphSource for PersistedState {
    fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

fn has_valid_shape(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.get("version").is_some_and(Value::is_number)
        && obj.get("timestamp").is_some_and(Value::is_number)
        && obj.get("nodes").is_some_and(Value::is_array)
        && obj.get("edges").is_some_and(Value::is_array)
}

/// A named snapshot as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Display name
    pub name: String,
    /// Captured state
    pub state: PersistedState,
}

impl Snapshot {
    /// Validate a raw snapshot payload
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let mut obj = match value {
            Value::Object(obj) => obj,
            _ => return None,
        };
        let name = obj
            .remove("name")
            .and_then(|v| v.as_str().map(sanitize_label))
            .unwrap_or_else(|| sanitize_label(""));
        let state = PersistedState::from_value(obj.remove("state")?)?;
        Some(Self { name, state })
    }
}

/// Listing entry for a stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Storage key, `canvas-snapshot-<timestamp>`
    pub id: String,
    /// Display name
    pub name: String,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
    /// Node count
    pub node_count: usize,
    /// Edge count
    pub edge_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_model::{Graph, NodeKind};
    use serde_json::json;

    #[test]
    fn rejects_malformed_shapes() {
        assert!(PersistedState::parse("not json").is_none());
        assert!(PersistedState::parse("[]").is_none());
        assert!(PersistedState::parse(r#"{"version":"1","timestamp":1,"nodes":[],"edges":[]}"#).is_none());
        assert!(PersistedState::parse(r#"{"version":1,"timestamp":1,"nodes":{},"edges":[]}"#).is_none());
        assert!(PersistedState::parse(r#"{"version":1,"nodes":[],"edges":[]}"#).is_none());
    }

    #[test]
    fn accepts_valid_shape_and_sanitizes() {
        let raw = json!({
            "version": 1,
            "timestamp": 1_700_000_000_000_i64,
            "nodes": [{"id": "a", "type": "goal", "data": {"label": "<b>Grow</b>"}}],
            "edges": []
        });
        let state = PersistedState::parse(&raw.to_string()).unwrap();
        assert_eq!(state.nodes[0].data.label, "Grow");
        assert_eq!(state.nodes[0].kind, NodeKind::Goal);
    }

    #[test]
    fn capture_reads_only_graph() {
        let graph = Graph::new(vec![Node::new("a", NodeKind::Decision, "<<>>")], vec![]);
        let state = PersistedState::capture(&graph, 5);
        assert_eq!(state.version, SCHEMA_VERSION);
        assert_eq!(state.timestamp, 5);
        assert_eq!(state.nodes[0].data.label, "Untitled");
    }

    #[test]
    fn snapshot_requires_valid_state() {
        assert!(Snapshot::parse(r#"{"name":"x","state":{"version":1}}"#).is_none());
        let ok = Snapshot::parse(
            r#"{"name":"<i>v1</i>","state":{"version":1,"timestamp":2,"nodes":[],"edges":[]}}"#,
        )
        .unwrap();
        assert_eq!(ok.name, "v1");
    }
}
