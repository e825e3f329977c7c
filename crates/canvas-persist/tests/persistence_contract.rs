//! Contract tests for the persistence layer.
//!
//! These anchor the storage-facing guarantees of the canvas:
//! - Round-trips reproduce nodes and edges except for sanitized labels.
//! - Staged edits and preview results never reach a stored payload.
//! - Snapshot history is bounded to the ten most recent captures.

use std::sync::Arc;

use canvas_model::{
    CanvasDocument, Confidence, ConfidenceLevel, ContentHash, Edge, Graph, ManualClock,
    ModelCard, Node, NodeKind, Report, ResultRanges,
};
use canvas_persist::{CanvasPersistence, FileStore, KeyValueStore, MemoryStore, STATE_KEY};
use pretty_assertions::assert_eq;

fn layer() -> (CanvasPersistence, Arc<MemoryStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let layer = CanvasPersistence::new(store.clone()).with_clock(clock.clone());
    (layer, store, clock)
}

fn preview_report() -> Report {
    Report {
        response_id: "PREVIEW_RESPONSE".into(),
        template_id: "pricing-v1".into(),
        seed: 4,
        model_card: ModelCard {
            response_hash: ContentHash::compute(b"preview"),
            template_version: "1.0".into(),
        },
        results: ResultRanges {
            conservative: 1.0,
            likely: 2.0,
            optimistic: 3.0,
            units: "USD".into(),
        },
        confidence: Confidence {
            level: ConfidenceLevel::Low,
            why: "preview".into(),
        },
        drivers: vec![],
    }
}

/// Round-trip keeps graph structure; only label text is rewritten.
#[test]
fn roundtrip_preserves_graph_except_labels() {
    let (layer, _, _) = layer();
    let graph = Graph::new(
        vec![
            Node::new("d", NodeKind::Decision, "<script>alert(1)</script>").at(1.0, 2.0),
            Node::new("o", NodeKind::Option, "<<>>"),
            Node::new("f", NodeKind::Factor, "Market size"),
        ],
        vec![Edge::new("e1", "d", "o"), Edge::new("e2", "f", "d").with_weight(0.25)],
    );

    assert!(layer.save_state(&graph));
    let loaded = layer.load_state().expect("state should load");

    let labels: Vec<&str> = loaded.nodes.iter().map(|n| n.data.label.as_str()).collect();
    assert_eq!(labels, vec!["alert(1)", "Untitled", "Market size"]);
    assert_eq!(loaded.edges, graph.edges);
    for (before, after) in graph.nodes.iter().zip(&loaded.nodes) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.kind, after.kind);
        assert_eq!(before.position, after.position);
    }
}

/// Staged and preview state is excluded by construction.
#[test]
fn transient_state_never_persisted() {
    let (layer, store, _) = layer();
    let mut doc = CanvasDocument::new(Graph::new(
        vec![Node::new("a", NodeKind::Decision, "Committed")],
        vec![],
    ));
    doc.staged
        .added_nodes
        .push(Node::new("STAGED_NODE", NodeKind::Risk, "STAGED_SECRET"));
    doc.staged.removed_nodes.insert("a".into());
    doc.preview = Some(preview_report());

    assert!(layer.save_state(&doc));
    let raw = store.get(STATE_KEY).unwrap();
    for forbidden in ["STAGED_SECRET", "STAGED_NODE", "stagedNodes", "staged", "preview", "PREVIEW_RESPONSE"] {
        assert!(!raw.contains(forbidden), "stored payload leaked {forbidden}");
    }

    let exported = layer.export_canvas(&doc).unwrap();
    assert!(!exported.contains("STAGED_SECRET"));
    assert!(!exported.contains("preview"));

    let snap = layer.save_snapshot("with staged", &doc).unwrap();
    let raw_snapshot = store.get(&snap.id).unwrap();
    assert!(!raw_snapshot.contains("STAGED_SECRET"));
}

/// Saving twelve snapshots keeps exactly the ten most recent.
#[test]
fn snapshot_rotation_keeps_ten_most_recent() {
    let (layer, _, clock) = layer();
    let graph = Graph::new(vec![Node::new("a", NodeKind::Goal, "Grow")], vec![]);

    let mut saved = Vec::new();
    for i in 0..12 {
        clock.advance(1_000);
        let meta = layer.save_snapshot(&format!("snap {i}"), &graph).unwrap();
        saved.push(meta.timestamp);
    }

    let listed = layer.list_snapshots();
    assert_eq!(listed.len(), 10);

    let mut expected: Vec<i64> = saved[2..].to_vec();
    expected.reverse();
    let got: Vec<i64> = listed.iter().map(|m| m.timestamp).collect();
    assert_eq!(got, expected);
    assert_eq!(listed[0].name, "snap 11");
}

/// Loading a snapshot returns its sanitized state.
#[test]
fn snapshot_load_and_delete() {
    let (layer, _, _) = layer();
    let graph = Graph::new(vec![Node::new("a", NodeKind::Goal, "<b>Grow</b>")], vec![]);
    let meta = layer.save_snapshot("<i>first</i>", &graph).unwrap();
    assert_eq!(meta.name, "first");

    let state = layer.load_snapshot(&meta.id).unwrap();
    assert_eq!(state.nodes[0].data.label, "Grow");

    assert!(layer.delete_snapshot(&meta.id));
    assert!(layer.load_snapshot(&meta.id).is_none());
    assert!(layer.list_snapshots().is_empty());
}

/// Import rejects anything that is not the persisted shape.
#[test]
fn import_validates_shape() {
    let (layer, _, _) = layer();
    assert!(layer.import_canvas("").is_none());
    assert!(layer.import_canvas("{\"version\":1,\"timestamp\":1,\"nodes\":[]}").is_none());
    let ok = layer
        .import_canvas(r#"{"version":1,"timestamp":1,"nodes":[{"id":"x","data":{"label":"<<>>"}}],"edges":[]}"#)
        .unwrap();
    assert_eq!(ok.nodes[0].data.label, "Untitled");
}

/// The file-backed store honours the same contract.
#[test]
fn file_store_backs_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let layer = CanvasPersistence::new(store);
    let graph = Graph::new(vec![Node::new("a", NodeKind::Outcome, "Profit")], vec![]);

    assert!(layer.save_state(&graph));
    assert_eq!(layer.load_state().unwrap().nodes, graph.nodes);
    assert!(layer.save_snapshot("disk", &graph).is_some());
    assert_eq!(layer.list_snapshots().len(), 1);
}
