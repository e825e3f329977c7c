//! Decision canvas data model
//!
//! Types shared by every layer of the run core:
//! - Canvas graph, staged edits and the in-memory document
//! - Run requests, seeds and streaming lifecycle events
//! - Reports, decision reviews and error descriptors
//! - Engine limits and templates
//! - Content hashing and the wall-clock seam

#![warn(unreachable_pub)]

pub mod clock;
pub mod error;
pub mod event;
pub mod graph;
pub mod hash;
pub mod limits;
pub mod report;
pub mod request;
pub mod template;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorCode, ErrorDescriptor};
pub use event::{RunCompletion, RunDiagnostics, StreamEvent};
pub use graph::{
    CanvasDocument, Edge, EdgeData, EdgeOverride, Graph, GraphSource, Node, NodeData, NodeKind,
    NodeOverride, Position, StagedEdits,
};
pub use hash::{ContentHash, HashError};
pub use limits::{EngineLimits, LimitsSnapshot, LimitsSource};
pub use report::{
    Confidence, ConfidenceLevel, DecisionReview, Driver, ModelCard, Polarity, Report,
    ResultRanges, ReviewState, Strength,
};
pub use request::{RunRequest, Seed};
pub use template::{TemplateDetail, TemplateList, TemplateSummary};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
