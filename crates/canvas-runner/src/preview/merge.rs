//! Non-mutating merge of committed graph and staged edits

use canvas_model::{Edge, Graph, Node, StagedEdits};

/// Graph the preview would run against
///
/// Neither input is modified. Removed nodes take their edges with them;
/// overrides apply to committed and added items alike.
#[must_use]
pub fn merge_staged(committed: &Graph, staged: &StagedEdits) -> Graph {
    let nodes: Vec<Node> = committed
        .nodes
        .iter()
        .chain(&staged.added_nodes)
        .filter(|node| !staged.removed_nodes.contains(&node.id))
        .cloned()
        .map(|mut node| {
            if let Some(patch) = staged.node_overrides.get(&node.id) {
                if let Some(label) = &patch.label {
                    node.data.label.clone_from(label);
                }
                for (key, value) in &patch.data {
                    node.data.extra.insert(key.clone(), value.clone());
                }
            }
            node
        })
        .collect();

    let edges: Vec<Edge> = committed
        .edges
        .iter()
        .chain(&staged.added_edges)
        .filter(|edge| {
            !staged.removed_edges.contains(&edge.id)
                && !staged.removed_nodes.contains(&edge.source)
                && !staged.removed_nodes.contains(&edge.target)
        })
        .cloned()
        .map(|mut edge| {
            if let Some(patch) = staged.edge_overrides.get(&edge.id) {
                if patch.weight.is_some() {
                    edge.data.weight = patch.weight;
                }
                if patch.belief.is_some() {
                    edge.data.belief = patch.belief;
                }
            }
            edge
        })
        .collect();

    Graph::new(nodes, edges)
}
