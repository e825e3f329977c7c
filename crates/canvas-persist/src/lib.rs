//! Canvas persistence layer
//!
//! The trusted boundary between in-memory canvas state and durable storage.
//!
//! # Core Operations
//!
//! - **State**: `save_state` / `load_state` under `canvas-storage`
//! - **Snapshots**: `save_snapshot` / `list_snapshots` / `load_snapshot` /
//!   `delete_snapshot`, at most ten retained
//! - **Exchange**: `export_canvas` / `import_canvas`
//!
//! # Architecture
//!
//! ```text
//! CanvasDocument ──capture──▶ PersistedState ──sanitize──▶ JSON ──▶ KeyValueStore
//!                                   ▲                                   │
//!                                   └────── validate + sanitize ◀───────┘
//! ```
//!
//! Only `nodes` and `edges` are read from the document, so staged edits and
//! preview results cannot reach storage.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod layer;
pub mod sanitize;
pub mod state;
pub mod storage;

pub use error::{PersistError, StorageError};
pub use layer::{
    CanvasPersistence, SaveMeta, MAX_PAYLOAD_BYTES, MAX_SNAPSHOTS, META_KEY, SNAPSHOT_PREFIX,
    STATE_KEY,
};
pub use sanitize::{sanitize_label, UNTITLED};
pub use state::{PersistedState, Snapshot, SnapshotMeta, SCHEMA_VERSION};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
