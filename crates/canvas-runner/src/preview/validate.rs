//! Structural validation of a graph before dispatch
//!
//! Checks, in order:
//! - duplicate node and edge ids
//! - edges pointing at missing nodes
//! - directed cycles (strongly connected components and self-loops)
//! - orphan nodes, when the graph has more than one node

use std::collections::{BTreeSet, HashMap, HashSet};

use canvas_model::{ErrorDescriptor, Graph};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

/// One structural problem
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphIssue {
    /// Node id used more than once
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),
    /// Edge id used more than once
    #[error("duplicate edge id '{0}'")]
    DuplicateEdge(String),
    /// Edge endpoint does not exist
    #[error("edge '{edge}' references missing node '{node}'")]
    DanglingEdge {
        /// Edge id
        edge: String,
        /// Missing node id
        node: String,
    },
    /// Nodes forming a directed cycle
    #[error("cycle through {}", .0.join(", "))]
    Cycle(Vec<String>),
    /// Node with no edges
    #[error("node '{0}' is not connected")]
    Orphan(String),
}

impl GraphIssue {
    /// Field paths the issue points at
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        match self {
            Self::DuplicateNode(id) | Self::Orphan(id) => vec![format!("nodes.{id}")],
            Self::DuplicateEdge(id) | Self::DanglingEdge { edge: id, .. } => {
                vec![format!("edges.{id}")]
            }
            Self::Cycle(ids) => ids.iter().map(|id| format!("nodes.{id}")).collect(),
        }
    }
}

/// Every structural issue in `graph`
#[must_use]
pub fn graph_issues(graph: &Graph) -> Vec<GraphIssue> {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(GraphIssue::DuplicateNode(node.id.clone()));
        }
    }
    let mut seen_edges = HashSet::new();
    for edge in &graph.edges {
        if !seen_edges.insert(edge.id.as_str()) {
            issues.push(GraphIssue::DuplicateEdge(edge.id.clone()));
        }
    }

    let index: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.as_str(), i))
        .collect();
    let mut dag: DiGraphMap<usize, ()> = DiGraphMap::new();
    for i in index.values() {
        dag.add_node(*i);
    }
    let mut connected = HashSet::new();
    for edge in &graph.edges {
        let mut endpoints = Vec::with_capacity(2);
        for end in [&edge.source, &edge.target] {
            match index.get(end.as_str()) {
                Some(i) => endpoints.push(*i),
                None => issues.push(GraphIssue::DanglingEdge {
                    edge: edge.id.clone(),
                    node: end.clone(),
                }),
            }
        }
        if let [from, to] = endpoints[..] {
            dag.add_edge(from, to, ());
            connected.insert(from);
            connected.insert(to);
        }
    }

    for component in tarjan_scc(&dag) {
        let cyclic = component.len() > 1
            || component
                .first()
                .is_some_and(|i| dag.contains_edge(*i, *i));
        if cyclic {
            let ids: BTreeSet<String> = component
                .iter()
                .map(|i| graph.nodes[*i].id.clone())
                .collect();
            issues.push(GraphIssue::Cycle(ids.into_iter().collect()));
        }
    }

    if index.len() > 1 {
        let mut orphans: Vec<&str> = index
            .iter()
            .filter(|(_, i)| !connected.contains(*i))
            .map(|(id, _)| *id)
            .collect();
        orphans.sort_unstable();
        issues.extend(orphans.into_iter().map(|id| GraphIssue::Orphan(id.to_string())));
    }

    issues
}

/// Validate `graph`, folding every issue into one `BAD_INPUT` descriptor
///
/// # Errors
/// Returns the descriptor when any issue is found
pub fn validate_graph(graph: &Graph) -> Result<(), ErrorDescriptor> {
    let issues = graph_issues(graph);
    if issues.is_empty() {
        return Ok(());
    }
    let message = issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    let mut fields: Vec<String> = Vec::new();
    for field in issues.iter().flat_map(GraphIssue::fields) {
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    Err(ErrorDescriptor::bad_input(message).with_fields(fields))
}
