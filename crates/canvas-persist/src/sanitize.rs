//! Label and payload sanitization
//!
//! Applied on every save, load, import and snapshot path. Labels go through
//! tag stripping, bracket stripping, control-character stripping and
//! truncation. Free-form node and edge data is walked recursively, dropping
//! framework-internal keys and DOM-element-like objects so that persisted
//! JSON is always plain data.

use canvas_model::{Edge, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Maximum label length in characters
pub const MAX_LABEL_CHARS: usize = 100;

/// Label used when nothing survives sanitization
pub const UNTITLED: &str = "Untitled";

/// Keys whose string values are treated as labels
const LABEL_KEYS: &[&str] = &["label", "title", "name"];

/// Exact keys owned by the UI framework
const INTERNAL_KEYS: &[&str] = &["_owner", "_store", "_self", "_source", "ref"];

/// Key prefixes owned by the UI framework
const INTERNAL_PREFIXES: &[&str] = &["__", "$$", "_react"];

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Sanitize a display label
///
/// `<script>x</script>` keeps `x`; `<<>>` becomes `"Untitled"`.
#[must_use]
pub fn sanitize_label(raw: &str) -> String {
    let without_tags = TAG.replace_all(raw, "");
    let cleaned: String = without_tags
        .chars()
        .filter(|c| *c != '<' && *c != '>' && !c.is_control())
        .collect();
    let truncated: String = cleaned.trim().chars().take(MAX_LABEL_CHARS).collect();
    let trimmed = truncated.trim();
    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// True for keys the UI framework attaches to live objects
#[must_use]
pub fn is_internal_key(key: &str) -> bool {
    INTERNAL_KEYS.contains(&key) || INTERNAL_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn is_dom_like(map: &Map<String, Value>) -> bool {
    map.get("nodeType").is_some_and(Value::is_number)
        && map.get("nodeName").is_some_and(Value::is_string)
}

/// Sanitize a JSON value found under `key`
///
/// Returns `None` when the value must be dropped entirely.
#[must_use]
pub fn sanitize_value(key: Option<&str>, value: Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            if is_dom_like(&map) {
                return None;
            }
            Some(Value::Object(sanitize_map(map)))
        }
        Value::Array(items) => Some(Value::Array(
            items
                .into_iter()
                .filter_map(|item| sanitize_value(None, item))
                .collect(),
        )),
        Value::String(s) => {
            if key.is_some_and(|k| LABEL_KEYS.contains(&k)) {
                Some(Value::String(sanitize_label(&s)))
            } else {
                Some(Value::String(s.chars().filter(|c| !c.is_control()).collect()))
            }
        }
        other => Some(other),
    }
}

/// Sanitize every entry of a JSON object
#[must_use]
pub fn sanitize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(k, _)| !is_internal_key(k))
        .filter_map(|(k, v)| sanitize_value(Some(&k), v).map(|v| (k, v)))
        .collect()
}

/// Sanitize a node's label and data
#[must_use]
pub fn sanitize_node(mut node: Node) -> Node {
    node.data.label = sanitize_label(&node.data.label);
    node.data.extra = sanitize_map(std::mem::take(&mut node.data.extra));
    node
}

/// Sanitize an edge's label and data
#[must_use]
pub fn sanitize_edge(mut edge: Edge) -> Edge {
    edge.data.label = edge.data.label.as_deref().map(sanitize_label);
    edge.data.extra = sanitize_map(std::mem::take(&mut edge.data.extra));
    edge
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_model::NodeKind;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn script_tag_removed_inner_text_kept() {
        assert_eq!(sanitize_label("<script>alert(1)</script>"), "alert(1)");
        assert_eq!(sanitize_label("Launch <b>now</b>"), "Launch now");
    }

    #[test]
    fn bracket_only_label_becomes_untitled() {
        assert_eq!(sanitize_label("<<>>"), UNTITLED);
        assert_eq!(sanitize_label("   "), UNTITLED);
        assert_eq!(sanitize_label(""), UNTITLED);
    }

    #[test]
    fn control_characters_stripped() {
        assert_eq!(sanitize_label("a\u{0007}b\nc"), "abc");
    }

    #[test]
    fn long_labels_truncated() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_label(&long).chars().count(), MAX_LABEL_CHARS);
    }

    #[test]
    fn internal_keys_and_dom_objects_dropped() {
        let raw = json!({
            "score": 3,
            "__reactFiber$abc": {"x": 1},
            "$$typeof": "element",
            "_owner": null,
            "anchor": {"nodeType": 1, "nodeName": "DIV"},
            "nested": {"label": "<i>deep</i>", "items": [{"nodeType": 1, "nodeName": "SPAN"}, 2]}
        });
        let Value::Object(map) = raw else { unreachable!() };
        let clean = sanitize_map(map);
        assert_eq!(
            Value::Object(clean),
            json!({"score": 3, "nested": {"label": "deep", "items": [2]}})
        );
    }

    #[test]
    fn node_sanitized_in_place() {
        let mut node = Node::new("n1", NodeKind::Risk, "<img src=x onerror=y>Risk");
        node.data.extra.insert("__proto_hack".into(), json!(1));
        let node = sanitize_node(node);
        assert_eq!(node.data.label, "Risk");
        assert!(node.data.extra.is_empty());
    }

    proptest! {
        #[test]
        fn sanitized_labels_are_bounded_and_bracket_free(raw in ".{0,300}") {
            let label = sanitize_label(&raw);
            prop_assert!(!label.is_empty());
            prop_assert!(label.chars().count() <= MAX_LABEL_CHARS);
            prop_assert!(!label.contains('<') && !label.contains('>'));
            prop_assert!(!label.chars().any(char::is_control));
        }

        #[test]
        fn sanitize_label_is_idempotent(raw in ".{0,120}") {
            let once = sanitize_label(&raw);
            prop_assert_eq!(sanitize_label(&once), once.clone());
        }
    }
}
