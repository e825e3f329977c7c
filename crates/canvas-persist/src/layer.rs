//! Persistence layer - main entry point
//!
//! Provides the trusted boundary between in-memory canvas state and durable
//! storage:
//! - Live state save/load under a single key
//! - Named snapshots with bounded rotation
//! - Export/import of sanitized JSON
//!
//! Every path validates and sanitizes. Failures are logged and reported as
//! `false`/`None`; nothing here panics on bad input or a full store.

use std::sync::Arc;

use canvas_model::{Clock, GraphSource, SystemClock};
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::state::{PersistedState, Snapshot, SnapshotMeta};
use crate::storage::KeyValueStore;

/// Key of the live persisted state
pub const STATE_KEY: &str = "canvas-storage";

/// Key of the save metadata record
pub const META_KEY: &str = "canvas-storage-meta";

/// Prefix of snapshot keys
pub const SNAPSHOT_PREFIX: &str = "canvas-snapshot-";

/// Snapshots retained after rotation
pub const MAX_SNAPSHOTS: usize = 10;

/// Size guard for any persisted payload
pub const MAX_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Metadata written beside the live state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveMeta {
    /// Save time, epoch milliseconds
    pub saved_at: i64,
    /// Serialized payload size
    pub bytes: usize,
}

/// Persistence layer over a key-value store
#[derive(Debug, Clone)]
pub struct CanvasPersistence {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_payload_bytes: usize,
    max_snapshots: usize,
}

impl CanvasPersistence {
    /// Create a layer using the system clock
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            max_snapshots: MAX_SNAPSHOTS,
        }
    }

    /// Use a custom clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the payload size guard
    #[must_use]
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    /// Override the snapshot retention count
    #[must_use]
    pub fn with_max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots = max.max(1);
        self
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Save the committed graph of `source`
    ///
    /// # Errors
    /// - `PersistError::TooLarge` over the size guard (nothing written)
    /// - `PersistError::Storage` when the store rejects the write
    pub fn try_save_state(
        &self,
        source: &(impl GraphSource + ?Sized),
    ) -> Result<PersistedState, PersistError> {
        let state = PersistedState::capture(source, self.clock.now_ms());
        let json = serde_json::to_string(&state)?;
        self.guard_size(json.len())?;
        self.store.set(STATE_KEY, &json)?;

        let meta = SaveMeta {
            saved_at: state.timestamp,
            bytes: json.len(),
        };
        if let Err(err) = serde_json::to_string(&meta)
            .map_err(PersistError::from)
            .and_then(|m| self.store.set(META_KEY, &m).map_err(PersistError::from))
        {
            tracing::warn!("failed to write save metadata: {err}");
        }

        tracing::debug!(
            nodes = state.nodes.len(),
            edges = state.edges.len(),
            bytes = json.len(),
            "canvas state saved"
        );
        Ok(state)
    }

    /// Save the committed graph of `source`; `false` on any failure
    pub fn save_state(&self, source: &(impl GraphSource + ?Sized)) -> bool {
        match self.try_save_state(source) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!("canvas state not saved: {err}");
                false
            }
        }
    }

    /// Load the live state; `None` when absent or invalid
    #[must_use]
    pub fn load_state(&self) -> Option<PersistedState> {
        let raw = self.store.get(STATE_KEY)?;
        let state = PersistedState::parse(&raw);
        if state.is_none() {
            tracing::warn!("discarding invalid persisted canvas state");
        }
        state
    }

    /// Remove the live state and its metadata
    pub fn clear_state(&self) {
        self.store.remove(STATE_KEY);
        self.store.remove(META_KEY);
    }

    /// Metadata of the last successful save
    #[must_use]
    pub fn last_saved(&self) -> Option<SaveMeta> {
        let raw = self.store.get(META_KEY)?;
        serde_json::from_str(&raw).ok()
    }

    /// Save a named snapshot and rotate old ones out
    ///
    /// # Errors
    /// - `PersistError::TooLarge` over the size guard (nothing written)
    /// - `PersistError::Storage` when the store rejects the write
    pub fn try_save_snapshot(
        &self,
        name: &str,
        source: &(impl GraphSource + ?Sized),
    ) -> Result<SnapshotMeta, PersistError> {
        let mut timestamp = self.clock.now_ms();
        while self.store.get(&snapshot_key(timestamp)).is_some() {
            timestamp += 1;
        }

        let snapshot = Snapshot {
            name: crate::sanitize::sanitize_label(name),
            state: PersistedState::capture(source, timestamp),
        };
        let json = serde_json::to_string(&snapshot)?;
        self.guard_size(json.len())?;

        let id = snapshot_key(timestamp);
        self.store.set(&id, &json)?;
        self.rotate_snapshots();

        tracing::info!(snapshot = %id, name = %snapshot.name, "snapshot saved");
        Ok(meta_for(id, &snapshot))
    }

    /// Save a named snapshot; `None` on any failure
    pub fn save_snapshot(
        &self,
        name: &str,
        source: &(impl GraphSource + ?Sized),
    ) -> Option<SnapshotMeta> {
        match self.try_save_snapshot(name, source) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!("snapshot not saved: {err}");
                None
            }
        }
    }

    /// Valid snapshots, newest first
    #[must_use]
    pub fn list_snapshots(&self) -> Vec<SnapshotMeta> {
        let mut metas: Vec<SnapshotMeta> = self
            .snapshot_keys()
            .into_iter()
            .filter_map(|key| {
                let snapshot = Snapshot::parse(&self.store.get(&key)?)?;
                Some(meta_for(key, &snapshot))
            })
            .collect();
        metas.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        metas
    }

    /// Load a snapshot's state by id
    #[must_use]
    pub fn load_snapshot(&self, id: &str) -> Option<PersistedState> {
        if !id.starts_with(SNAPSHOT_PREFIX) {
            return None;
        }
        Snapshot::parse(&self.store.get(id)?).map(|s| s.state)
    }

    /// Delete a snapshot; `true` when it existed
    pub fn delete_snapshot(&self, id: &str) -> bool {
        if !id.starts_with(SNAPSHOT_PREFIX) || self.store.get(id).is_none() {
            return false;
        }
        self.store.remove(id);
        true
    }

    /// Export the committed graph as pretty JSON
    ///
    /// # Errors
    /// - `PersistError::TooLarge` over the size guard
    pub fn export_canvas(&self, source: &(impl GraphSource + ?Sized)) -> Result<String, PersistError> {
        let state = PersistedState::capture(source, self.clock.now_ms());
        let json = serde_json::to_string_pretty(&state)?;
        self.guard_size(json.len())?;
        Ok(json)
    }

    /// Validate and sanitize an imported payload
    #[must_use]
    pub fn import_canvas(&self, raw: &str) -> Option<PersistedState> {
        if raw.len() > self.max_payload_bytes {
            tracing::warn!(bytes = raw.len(), "import rejected: payload too large");
            return None;
        }
        PersistedState::parse(raw)
    }

    fn guard_size(&self, bytes: usize) -> Result<(), PersistError> {
        if bytes > self.max_payload_bytes {
            return Err(PersistError::TooLarge {
                bytes,
                max: self.max_payload_bytes,
            });
        }
        Ok(())
    }

    fn snapshot_keys(&self) -> Vec<String> {
        self.store
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(SNAPSHOT_PREFIX))
            .collect()
    }

    /// Evict oldest snapshots beyond the retention count
    fn rotate_snapshots(&self) {
        let mut stamped: Vec<(i64, String)> = self
            .snapshot_keys()
            .into_iter()
            .filter_map(|key| {
                let ts = key.strip_prefix(SNAPSHOT_PREFIX)?.parse::<i64>().ok()?;
                Some((ts, key))
            })
            .collect();
        if stamped.len() <= self.max_snapshots {
            return;
        }
        stamped.sort();
        let excess = stamped.len() - self.max_snapshots;
        for (_, key) in stamped.into_iter().take(excess) {
            tracing::debug!(snapshot = %key, "evicting snapshot");
            self.store.remove(&key);
        }
    }
}

fn snapshot_key(timestamp: i64) -> String {
    format!("{SNAPSHOT_PREFIX}{timestamp}")
}

fn meta_for(id: String, snapshot: &Snapshot) -> SnapshotMeta {
    SnapshotMeta {
        id,
        name: snapshot.name.clone(),
        timestamp: snapshot.state.timestamp,
        node_count: snapshot.state.nodes.len(),
        edge_count: snapshot.state.edges.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use canvas_model::{Edge, Graph, ManualClock, Node, NodeKind};

    fn layer_with_clock(start: i64) -> (CanvasPersistence, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let layer = CanvasPersistence::new(Arc::new(MemoryStore::new())).with_clock(clock.clone());
        (layer, clock)
    }

    fn sample_graph() -> Graph {
        Graph::new(
            vec![
                Node::new("a", NodeKind::Decision, "Launch?"),
                Node::new("b", NodeKind::Outcome, "Revenue"),
            ],
            vec![Edge::new("e1", "a", "b").with_weight(0.7)],
        )
    }

    #[test]
    fn save_then_load() {
        let (layer, _) = layer_with_clock(1_000);
        assert!(layer.save_state(&sample_graph()));
        let state = layer.load_state().unwrap();
        assert_eq!(state.timestamp, 1_000);
        assert_eq!(state.nodes, sample_graph().nodes);
        assert_eq!(layer.last_saved().unwrap().saved_at, 1_000);
    }

    #[test]
    fn oversized_payload_rejected_without_write() {
        let (layer, _) = layer_with_clock(1);
        let layer = layer.with_max_payload_bytes(16);
        assert!(!layer.save_state(&sample_graph()));
        assert!(layer.store().get(STATE_KEY).is_none());
    }

    #[test]
    fn quota_failure_reported_as_false() {
        let layer = CanvasPersistence::new(Arc::new(MemoryStore::with_quota(8)));
        assert!(!layer.save_state(&sample_graph()));
        assert!(layer.load_state().is_none());
    }

    #[test]
    fn invalid_stored_state_is_absent() {
        let (layer, _) = layer_with_clock(1);
        layer.store().set(STATE_KEY, "{\"version\":1}").unwrap();
        assert!(layer.load_state().is_none());
    }

    #[test]
    fn snapshot_ids_do_not_collide_within_a_millisecond() {
        let (layer, _) = layer_with_clock(50);
        let a = layer.save_snapshot("a", &sample_graph()).unwrap();
        let b = layer.save_snapshot("b", &sample_graph()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(layer.list_snapshots().len(), 2);
    }

    #[test]
    fn delete_snapshot_only_touches_snapshot_keys() {
        let (layer, _) = layer_with_clock(7);
        assert!(layer.save_state(&sample_graph()));
        assert!(!layer.delete_snapshot(STATE_KEY));
        let meta = layer.save_snapshot("keep", &sample_graph()).unwrap();
        assert!(layer.delete_snapshot(&meta.id));
        assert!(!layer.delete_snapshot(&meta.id));
        assert!(layer.load_state().is_some());
    }

    #[test]
    fn export_import_roundtrip() {
        let (layer, _) = layer_with_clock(9);
        let json = layer.export_canvas(&sample_graph()).unwrap();
        let imported = layer.import_canvas(&json).unwrap();
        assert_eq!(imported.edges, sample_graph().edges);
        assert!(layer.import_canvas("{\"nodes\":[]}").is_none());
    }
}
