//! Run orchestration for the decision canvas
//!
//! # Components
//!
//! - **Results runs**: [`RunOrchestrator`], one run at a time, deduped by
//!   request hash and guarded by engine limits
//! - **Previews**: [`PreviewOrchestrator`], debounced runs over the
//!   committed graph with staged edits merged in
//! - **Limits**: [`LimitsFetcher`], bounded retries and a per-session cap
//!
//! # Lifecycle
//!
//! ```text
//! idle ─▶ preparing ─▶ connecting ─▶ running ─▶ complete
//!              │            │           │  └──▶ error
//!              └────────────┴───────────┴─────▶ cancelled
//! ```
//!
//! Orchestrators publish into their own `watch` slot and never write to the
//! committed graph.

#![warn(unreachable_pub)]

pub mod config;
pub mod driver;
pub mod error;
pub mod history;
pub mod limits;
pub mod messages;
pub mod orchestrator;
pub mod preview;
pub mod state_machine;
pub mod telemetry;
pub mod view;

pub use config::{CanvasConfig, StorageConfig};
pub use driver::{progress_for_tick, RunOutcome, MAX_RUNNING_PROGRESS};
pub use error::{ConfigError, RunnerError};
pub use history::{HistoryEntry, RunHistory};
pub use limits::{LimitsConfig, LimitsFetcher, LimitsState};
pub use messages::{translate, UserMessage};
pub use orchestrator::{RunConfig, RunOrchestrator};
pub use preview::{PreviewConfig, PreviewOrchestrator};
pub use state_machine::{allowed_transitions, validate_transition, RunStatus};
pub use telemetry::{MetricsTelemetry, NoopTelemetry, RecordingTelemetry, Telemetry};
pub use view::{RunId, RunMeta, RunSlot, RunView};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::CanvasConfig;
    pub use crate::limits::LimitsFetcher;
    pub use crate::orchestrator::RunOrchestrator;
    pub use crate::preview::PreviewOrchestrator;
    pub use crate::state_machine::RunStatus;
    pub use crate::view::RunView;
}
