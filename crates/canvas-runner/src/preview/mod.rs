//! Debounced preview runs
//!
//! A preview runs the analysis against the committed graph with staged edits
//! layered on top, without touching either. Calls are debounced, last call
//! wins: each request cancels the pending timer and any in-flight preview
//! before arming a new one. Invalid merged graphs fail locally and never
//! reach the backend.

pub mod merge;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use canvas_engine::{AdapterSource, CancelHandle};
use canvas_model::{Graph, RunRequest, Seed, StagedEdits};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use ulid::Ulid;

use crate::driver::{execute, settle, DriveTiming, RunOutcome};
use crate::telemetry::{counters, MetricsTelemetry, Telemetry};
use crate::view::{RunId, RunSlot, RunView};

pub use merge::merge_staged;
pub use validate::{graph_issues, validate_graph, GraphIssue};

/// Preview orchestrator tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Quiet period before a preview is dispatched
    pub debounce_ms: u64,
    /// Minimum spacing between progress publications
    pub throttle_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            throttle_ms: 100,
        }
    }
}

/// Pending timer and its cancel handle
#[derive(Debug)]
struct Pending {
    run_id: RunId,
    cancel: CancelHandle,
    timer: JoinHandle<()>,
}

/// Debounced, single-slot preview orchestrator
#[derive(Debug)]
pub struct PreviewOrchestrator {
    source: Arc<dyn AdapterSource>,
    telemetry: Arc<dyn Telemetry>,
    config: PreviewConfig,
    slot: Arc<RunSlot>,
    pending: Mutex<Option<Pending>>,
}

impl PreviewOrchestrator {
    /// Orchestrator dispatching through `source`
    #[must_use]
    pub fn new(source: Arc<dyn AdapterSource>) -> Self {
        Self {
            source,
            telemetry: Arc::new(MetricsTelemetry),
            config: PreviewConfig::default(),
            slot: Arc::new(RunSlot::new()),
            pending: Mutex::new(None),
        }
    }

    /// Override tuning
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: PreviewConfig) -> Self {
        self.config = config;
        self
    }

    /// Counter sink
    #[inline]
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Observe the preview slot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunView> {
        self.slot.subscribe()
    }

    /// Current preview view
    #[must_use]
    pub fn view(&self) -> RunView {
        self.slot.snapshot()
    }

    /// Request a preview of `committed` with `staged` applied
    ///
    /// Validation runs immediately; dispatch waits for the debounce window.
    pub fn request_preview(
        &self,
        template_id: &str,
        committed: &Graph,
        staged: &StagedEdits,
        seed: Option<Seed>,
    ) -> RunId {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            self.disarm(previous);
        }

        let run_id = Ulid::new();
        if !self.slot.begin(run_id) {
            tracing::warn!(%run_id, status = %self.slot.status(), "preview slot busy");
            return run_id;
        }

        let merged = merge_staged(committed, staged);
        if let Err(err) = validate_graph(&merged) {
            tracing::info!(%run_id, fields = ?err.fields, "preview graph invalid");
            self.slot.fail(run_id, err);
            self.telemetry.increment(counters::PREVIEW_INVALID);
            return run_id;
        }

        let mut request = RunRequest::new(template_id).with_graph(merged);
        request.seed = seed;
        let cancel = CancelHandle::new();
        let timer = self.arm(run_id, request, cancel.clone());
        *pending = Some(Pending {
            run_id,
            cancel,
            timer,
        });
        run_id
    }

    fn arm(&self, run_id: RunId, request: RunRequest, cancel: CancelHandle) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let slot = Arc::clone(&self.slot);
        let telemetry = Arc::clone(&self.telemetry);
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let timing = DriveTiming {
            throttle: Duration::from_millis(self.config.throttle_ms),
            prepare_delay: Duration::ZERO,
        };
        let span = tracing::debug_span!("preview", %run_id);

        tokio::spawn(
            async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(debounce) => {}
                }
                if cancel.is_cancelled() {
                    return;
                }
                telemetry.increment(counters::PREVIEW_DISPATCHED);
                tracing::debug!(template_id = %request.template_id, "preview dispatched");
                let outcome =
                    execute(source.as_ref(), &request, run_id, &slot, &cancel, timing).await;
                if let RunOutcome::Failed(err) = &outcome {
                    tracing::debug!("preview failed: {err}");
                }
                settle(&slot, run_id, &outcome);
            }
            .instrument(span),
        )
    }

    fn disarm(&self, pending: Pending) {
        pending.cancel.cancel();
        pending.timer.abort();
        self.slot.cancel(pending.run_id);
    }

    /// Cancel the pending or in-flight preview
    ///
    /// Returns `true` if a preview was still running.
    pub fn cancel(&self) -> bool {
        let Some(pending) = self.pending.lock().take() else {
            return false;
        };
        let run_id = pending.run_id;
        pending.cancel.cancel();
        pending.timer.abort();
        self.slot.cancel(run_id)
    }

    /// Cancel anything pending and reset the preview slot to idle
    pub fn clear(&self) {
        self.cancel();
        self.slot.clear();
    }
}

impl Drop for PreviewOrchestrator {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.cancel.cancel();
            pending.timer.abort();
        }
    }
}
