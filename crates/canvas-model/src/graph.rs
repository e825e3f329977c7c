//! Canvas graph types
//!
//! The committed graph is the single shared mutable resource of the editor.
//! Staged edits and preview results live beside it in [`CanvasDocument`] and
//! are never part of what gets persisted; persistence only sees a
//! [`GraphSource`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::report::Report;

/// Node category on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The decision being analysed
    #[default]
    Decision,
    /// A candidate option
    Option,
    /// A contributing factor
    Factor,
    /// A risk
    Risk,
    /// An outcome
    Outcome,
    /// A goal
    Goal,
}

/// Canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset
    pub x: f64,
    /// Vertical offset
    pub y: f64,
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeData {
    /// Display label
    pub label: String,
    /// Free-form attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A canvas node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable node id
    pub id: String,
    /// Node category
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    /// Canvas position
    #[serde(default)]
    pub position: Position,
    /// Payload
    #[serde(default)]
    pub data: NodeData,
}

impl Node {
    /// Create a node at the origin
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            data: NodeData {
                label: label.into(),
                extra: Map::new(),
            },
        }
    }

    /// Place the node
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }
}

/// Edge payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeData {
    /// Optional display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Influence weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Belief in the relationship, 0..=1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belief: Option<f64>,
    /// Free-form attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A directed canvas edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Stable edge id
    pub id: String,
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Payload
    #[serde(default)]
    pub data: EdgeData,
}

impl Edge {
    /// Create an edge between two node ids
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            data: EdgeData::default(),
        }
    }

    /// Set the influence weight
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.data.weight = Some(weight);
        self
    }
}

/// Anything persistence may extract nodes and edges from
pub trait GraphSource {
    /// Committed nodes
    fn nodes(&self) -> &[Node];
    /// Committed edges
    fn edges(&self) -> &[Edge];
}

/// A decision graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    /// Nodes in insertion order
    pub nodes: Vec<Node>,
    /// Edges in insertion order
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Create a graph
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Look up a node by id
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True when the graph has no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl GraphSource for Graph {
    fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Staged override for a node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeOverride {
    /// Replacement label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Attributes merged over the committed ones
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Staged override for an edge
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeOverride {
    /// Replacement weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Replacement belief
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belief: Option<f64>,
}

/// Uncommitted edits layered over the committed graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StagedEdits {
    /// Nodes to add
    #[serde(default)]
    pub added_nodes: Vec<Node>,
    /// Node ids to remove
    #[serde(default)]
    pub removed_nodes: BTreeSet<String>,
    /// Per-node overrides
    #[serde(default)]
    pub node_overrides: BTreeMap<String, NodeOverride>,
    /// Edges to add
    #[serde(default)]
    pub added_edges: Vec<Edge>,
    /// Edge ids to remove
    #[serde(default)]
    pub removed_edges: BTreeSet<String>,
    /// Per-edge overrides
    #[serde(default)]
    pub edge_overrides: BTreeMap<String, EdgeOverride>,
}

impl StagedEdits {
    /// True when nothing is staged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.node_overrides.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && self.edge_overrides.is_empty()
    }
}

/// In-memory canvas: committed graph plus transient editing state
#[derive(Debug, Clone, Default)]
pub struct CanvasDocument {
    /// Committed graph
    pub graph: Graph,
    /// Staged, uncommitted edits
    pub staged: StagedEdits,
    /// Last preview result shown over the canvas
    pub preview: Option<Report>,
}

impl CanvasDocument {
    /// Wrap a committed graph
    #[must_use]
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            staged: StagedEdits::default(),
            preview: None,
        }
    }
}

impl GraphSource for CanvasDocument {
    fn nodes(&self) -> &[Node] {
        &self.graph.nodes
    }

    fn edges(&self) -> &[Edge] {
        &self.graph.edges
    }
}
