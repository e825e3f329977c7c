//! Streaming run orchestrator
//!
//! Owns the results slot and at most one in-flight run:
//! - `run()` cancels the in-flight run before starting a new one
//! - identical request hashes reuse the cached completion unless forced
//! - graphs over known engine limits are blocked locally
//!
//! ```text
//!  run() ──► supersede ──► begin ──► hash ──► limits guard ──► dedupe ──► spawn
//!                                       │            │             │         │
//!                                       ▼            ▼             ▼         ▼
//!                                    failed       blocked      cache hit   execute
//! ```

use std::sync::Arc;
use std::time::Duration;

use canvas_engine::{AdapterSource, AnalysisAdapter, CancelHandle};
use canvas_model::{
    Clock, ContentHash, ErrorCode, ErrorDescriptor, RunCompletion, RunRequest, Seed, SystemClock,
};
use moka::future::Cache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use ulid::Ulid;

use crate::driver::{execute, settle, DriveTiming, RunOutcome};
use crate::error::RunnerError;
use crate::history::{HistoryEntry, RunHistory, DEFAULT_HISTORY_LEN};
use crate::limits::LimitsState;
use crate::telemetry::{counters, MetricsTelemetry, Telemetry};
use crate::view::{RunId, RunSlot, RunView};

/// Run orchestrator tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Minimum spacing between progress publications
    pub throttle_ms: u64,
    /// Delay before a non-streaming dispatch
    pub prepare_delay_ms: u64,
    /// Finished runs kept in history
    pub history_len: usize,
    /// Completions kept for dedupe
    pub completion_cache_capacity: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 100,
            prepare_delay_ms: 200,
            history_len: DEFAULT_HISTORY_LEN,
            completion_cache_capacity: 64,
        }
    }
}

impl RunConfig {
    /// Driver timing derived from this config
    #[must_use]
    pub fn timing(&self) -> DriveTiming {
        DriveTiming {
            throttle: Duration::from_millis(self.throttle_ms),
            prepare_delay: Duration::from_millis(self.prepare_delay_ms),
        }
    }
}

#[derive(Debug)]
struct ActiveRun {
    run_id: RunId,
    cancel: CancelHandle,
    task: Option<JoinHandle<()>>,
}

/// Single-slot streaming run orchestrator
#[derive(Debug)]
pub struct RunOrchestrator {
    source: Arc<dyn AdapterSource>,
    telemetry: Arc<dyn Telemetry>,
    clock: Arc<dyn Clock>,
    config: RunConfig,
    slot: Arc<RunSlot>,
    active: Mutex<Option<ActiveRun>>,
    start_lock: tokio::sync::Mutex<()>,
    completions: Cache<ContentHash, Arc<RunCompletion>>,
    history: Arc<RunHistory>,
    limits: Option<watch::Receiver<LimitsState>>,
}

impl RunOrchestrator {
    /// Orchestrator dispatching through `source`
    #[must_use]
    pub fn new(source: Arc<dyn AdapterSource>) -> Self {
        Self::with_config(source, RunConfig::default())
    }

    /// Orchestrator with explicit tuning
    #[must_use]
    pub fn with_config(source: Arc<dyn AdapterSource>, config: RunConfig) -> Self {
        Self {
            source,
            telemetry: Arc::new(MetricsTelemetry),
            clock: Arc::new(SystemClock),
            slot: Arc::new(RunSlot::new()),
            active: Mutex::new(None),
            start_lock: tokio::sync::Mutex::new(()),
            completions: Cache::new(config.completion_cache_capacity),
            history: Arc::new(RunHistory::new(config.history_len)),
            limits: None,
            config,
        }
    }

    /// Counter sink
    #[inline]
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Clock for history timestamps
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Guard runs against the limits published on `limits`
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: watch::Receiver<LimitsState>) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Tuning in effect
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Observe the results slot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunView> {
        self.slot.subscribe()
    }

    /// Current results view
    #[must_use]
    pub fn view(&self) -> RunView {
        self.slot.snapshot()
    }

    /// Finished runs, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.entries()
    }

    /// Start a run for `request`
    ///
    /// Any in-flight run is cancelled first. With `force` the seed is bumped
    /// and the completion cache is bypassed.
    pub async fn run(&self, mut request: RunRequest, force: bool) -> RunId {
        let _start = self.start_lock.lock().await;
        self.supersede();

        if force {
            let base = match request.seed {
                Some(seed) => seed,
                None => self.template_seed(&request.template_id).await,
            };
            request.seed = Some(base.bumped());
        }

        let run_id = Ulid::new();
        if !self.slot.begin(run_id) {
            tracing::warn!(%run_id, status = %self.slot.status(), "results slot busy, run dropped");
            return run_id;
        }
        tracing::info!(
            %run_id,
            template_id = %request.template_id,
            seed = ?request.seed,
            force,
            "run requested"
        );

        let hash = match request.content_hash() {
            Ok(hash) => hash,
            Err(err) => {
                let err: ErrorDescriptor = RunnerError::from(err).into();
                self.finish_inline(run_id, &request, RunOutcome::Failed(err), counters::RUN_FAILED);
                return run_id;
            }
        };

        if let Some(err) = self.check_limits(&request) {
            tracing::warn!(%run_id, "run blocked by engine limits: {err}");
            self.finish_inline(run_id, &request, RunOutcome::Failed(err), counters::RUN_BLOCKED);
            return run_id;
        }

        if !force {
            if let Some(cached) = self.completions.get(&hash).await {
                tracing::info!(%run_id, hash = %hash.short(), "reusing cached completion");
                self.finish_inline(
                    run_id,
                    &request,
                    RunOutcome::Completed(cached),
                    counters::RUN_CACHE_HIT,
                );
                return run_id;
            }
        }

        self.telemetry.increment(counters::RUN_CLICKED);
        let cancel = CancelHandle::new();
        let task = self.spawn(run_id, request, hash, cancel.clone());
        *self.active.lock() = Some(ActiveRun {
            run_id,
            cancel,
            task: Some(task),
        });
        run_id
    }

    /// Seed a request without one would run with
    async fn template_seed(&self, template_id: &str) -> Seed {
        let detail = match self.source.resolve().await {
            Ok(adapter) => adapter.template(template_id).await,
            Err(err) => Err(err),
        };
        match detail {
            Ok(detail) => detail.default_seed,
            Err(err) => {
                tracing::debug!(template_id, "no template seed, using default: {err}");
                Seed::DEFAULT
            }
        }
    }

    fn spawn(
        &self,
        run_id: RunId,
        request: RunRequest,
        hash: ContentHash,
        cancel: CancelHandle,
    ) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let slot = Arc::clone(&self.slot);
        let telemetry = Arc::clone(&self.telemetry);
        let clock = Arc::clone(&self.clock);
        let history = Arc::clone(&self.history);
        let completions = self.completions.clone();
        let timing = self.config.timing();
        let span = tracing::info_span!("run", %run_id, hash = %hash.short());

        tokio::spawn(
            async move {
                let outcome = execute(source.as_ref(), &request, run_id, &slot, &cancel, timing).await;
                if let RunOutcome::Completed(completion) = &outcome {
                    completions.insert(hash, Arc::clone(completion)).await;
                }
                let settled = settle(&slot, run_id, &outcome);
                match &outcome {
                    RunOutcome::Completed(_) if settled => {
                        telemetry.increment(counters::RUN_COMPLETED);
                    }
                    RunOutcome::Failed(err) if settled => {
                        tracing::warn!(code = %err.code, "run failed: {}", err.message);
                        telemetry.increment(counters::RUN_FAILED);
                    }
                    _ => {}
                }
                history.push(HistoryEntry::new(run_id, &request, &outcome, clock.now_ms()));
            }
            .instrument(span),
        )
    }

    fn finish_inline(
        &self,
        run_id: RunId,
        request: &RunRequest,
        outcome: RunOutcome,
        counter: &'static str,
    ) {
        settle(&self.slot, run_id, &outcome);
        self.telemetry.increment(counter);
        self.history
            .push(HistoryEntry::new(run_id, request, &outcome, self.clock.now_ms()));
    }

    fn check_limits(&self, request: &RunRequest) -> Option<ErrorDescriptor> {
        let graph = request.graph.as_ref()?;
        let limits = self.limits.as_ref()?.borrow().limits?;
        let exceeded = limits.exceeded_by(graph.node_count(), graph.edge_count());
        if exceeded.is_empty() {
            return None;
        }
        Some(
            ErrorDescriptor::new(
                ErrorCode::LimitExceeded,
                format!(
                    "graph has {} nodes and {} edges; engine allows {} and {}",
                    graph.node_count(),
                    graph.edge_count(),
                    limits.max_nodes,
                    limits.max_edges
                ),
            )
            .with_fields(exceeded),
        )
    }

    /// Cancel the in-flight run and release the slot
    fn supersede(&self) {
        let previous = self.active.lock().take();
        if let Some(previous) = previous {
            if previous.cancel.cancel() {
                tracing::info!(run_id = %previous.run_id, "superseding in-flight run");
            }
            self.slot.cancel(previous.run_id);
        }
        let view = self.slot.snapshot();
        if let (true, Some(stale)) = (view.status.is_active(), view.run_id) {
            self.slot.cancel(stale);
        }
    }

    /// Cancel the in-flight run
    ///
    /// Returns `true` only when a running run was cancelled by this call;
    /// cancelling a finished or already-cancelled run is a no-op.
    pub fn cancel(&self) -> bool {
        let Some((run_id, cancel)) = self
            .active
            .lock()
            .as_ref()
            .map(|active| (active.run_id, active.cancel.clone()))
        else {
            return false;
        };
        cancel.cancel();
        let cancelled = self.slot.cancel(run_id);
        if cancelled {
            tracing::info!(%run_id, "run cancelled");
            self.telemetry.increment(counters::RUN_CANCELLED);
        }
        cancelled
    }

    /// Reset a finished results slot to idle
    pub fn clear(&self) -> bool {
        self.slot.clear()
    }

    /// Wait until the results slot is no longer running
    pub async fn wait(&self) -> RunView {
        let task = self.active.lock().as_mut().and_then(|active| active.task.take());
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::error!("run task failed: {err}");
            }
        }
        let mut rx = self.slot.subscribe();
        let settled = rx.wait_for(|view| !view.status.is_active()).await;
        match settled {
            Ok(view) => view.clone(),
            Err(_) => self.slot.snapshot(),
        }
    }
}

impl Drop for RunOrchestrator {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}
