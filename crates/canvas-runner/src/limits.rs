//! Engine limits fetcher
//!
//! Fetches capacity limits with a fixed retry schedule, publishes them on a
//! `watch` channel and guards against runaway refetching:
//! - each fetch makes up to one attempt per entry of `retry_delays_ms`
//! - one fetch never runs past `deadline_ms`, attempts and backoff included
//! - at most `max_attempts` underlying attempts per session, across all triggers
//! - visibility refreshes are rate limited; explicit retries are not

use std::sync::Arc;
use std::time::Duration;

use canvas_engine::AnalysisAdapter;
use canvas_model::{Clock, EngineLimits, ErrorDescriptor, LimitsSnapshot, LimitsSource, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::telemetry::{counters, MetricsTelemetry, Telemetry};

/// Limits fetcher tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Delay before each attempt of one fetch
    pub retry_delays_ms: Vec<u64>,
    /// Underlying attempts allowed per session
    pub max_attempts: u32,
    /// Minimum spacing of visibility-triggered fetches
    pub visibility_cooldown_ms: u64,
    /// Bound on each attempt
    pub attempt_timeout_ms: u64,
    /// Wall-clock bound on one whole fetch
    pub deadline_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            retry_delays_ms: vec![0, 2_000, 5_000],
            max_attempts: 10,
            visibility_cooldown_ms: 10_000,
            attempt_timeout_ms: 1_000,
            deadline_ms: 10_000,
        }
    }
}

/// Published limits state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitsState {
    /// Current limits; cleared when a fetch exhausts its attempts
    pub limits: Option<EngineLimits>,
    /// Provenance of `limits`
    pub source: Option<LimitsSource>,
    /// When `limits` was fetched, epoch milliseconds
    pub fetched_at_ms: Option<i64>,
    /// Last error of an exhausted fetch; never set for fallback limits
    pub error: Option<ErrorDescriptor>,
    /// A fetch is in progress
    pub loading: bool,
}

/// Retrying limits fetcher
#[derive(Debug)]
pub struct LimitsFetcher {
    adapter: Arc<dyn AnalysisAdapter>,
    config: LimitsConfig,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn Telemetry>,
    state: watch::Sender<LimitsState>,
    attempts: Mutex<u32>,
    last_visibility_fetch: Mutex<Option<Instant>>,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl LimitsFetcher {
    /// Fetcher over `adapter` with default tuning
    #[must_use]
    pub fn new(adapter: Arc<dyn AnalysisAdapter>) -> Self {
        Self {
            adapter,
            config: LimitsConfig::default(),
            clock: Arc::new(SystemClock),
            telemetry: Arc::new(MetricsTelemetry),
            state: watch::Sender::new(LimitsState::default()),
            attempts: Mutex::new(0),
            last_visibility_fetch: Mutex::new(None),
            fetch_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Override tuning
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: LimitsConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock for `fetched_at_ms`
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Counter sink
    #[inline]
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Observe the state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LimitsState> {
        self.state.subscribe()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> LimitsState {
        self.state.borrow().clone()
    }

    /// Underlying attempts made this session
    #[must_use]
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }

    fn take_attempt(&self) -> bool {
        let mut attempts = self.attempts.lock();
        if *attempts >= self.config.max_attempts {
            return false;
        }
        *attempts += 1;
        true
    }

    fn cap_reached(&self) -> bool {
        *self.attempts.lock() >= self.config.max_attempts
    }

    /// Fetch limits, retrying on the configured schedule
    ///
    /// A fetch already in progress is joined rather than duplicated.
    pub async fn fetch_limits(&self) -> LimitsState {
        if self.cap_reached() {
            tracing::warn!(cap = self.config.max_attempts, "limits fetch cap reached, ignoring");
            self.state.send_modify(|state| state.loading = false);
            return self.state();
        }
        let Ok(_guard) = self.fetch_lock.try_lock() else {
            let mut rx = self.subscribe();
            let _ = rx.wait_for(|state| !state.loading).await;
            return self.state();
        };
        self.state.send_modify(|state| state.loading = true);

        let deadline = Instant::now() + Duration::from_millis(self.config.deadline_ms);
        let mut last_error = None;
        for (attempt, delay_ms) in self.config.retry_delays_ms.iter().enumerate() {
            if self.cap_reached() {
                tracing::warn!("limits fetch cap reached mid-retry");
                break;
            }
            let delay = Duration::from_millis(*delay_ms);
            if Instant::now() + delay >= deadline {
                tracing::debug!(attempt, "limits fetch deadline reached");
                last_error = last_error.or_else(|| Some(self.deadline_error()));
                break;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !self.take_attempt() {
                break;
            }
            let timeout = Duration::from_millis(self.config.attempt_timeout_ms)
                .min(deadline.saturating_duration_since(Instant::now()));
            match tokio::time::timeout(timeout, self.adapter.limits()).await {
                Ok(Ok(snapshot)) => {
                    self.publish(snapshot);
                    return self.state();
                }
                Ok(Err(err)) => {
                    tracing::debug!(attempt, "limits fetch failed: {err}");
                    last_error = Some(err);
                }
                Err(_) => {
                    tracing::debug!(attempt, "limits fetch timed out");
                    last_error = Some(ErrorDescriptor::timeout(format!(
                        "limits request exceeded {}ms",
                        timeout.as_millis()
                    )));
                }
            }
        }

        if let Some(err) = &last_error {
            tracing::warn!("limits unavailable: {err}");
        }
        self.state.send_modify(|state| {
            state.limits = None;
            state.source = None;
            state.error = last_error;
            state.loading = false;
        });
        self.state()
    }

    fn deadline_error(&self) -> ErrorDescriptor {
        ErrorDescriptor::timeout(format!(
            "limits fetch exceeded {}ms",
            self.config.deadline_ms
        ))
    }

    fn publish(&self, snapshot: LimitsSnapshot) {
        if snapshot.source == LimitsSource::Fallback {
            self.telemetry.increment(counters::LIMITS_FALLBACK);
        }
        let now = self.clock.now_ms();
        tracing::info!(
            max_nodes = snapshot.limits.max_nodes,
            max_edges = snapshot.limits.max_edges,
            source = ?snapshot.source,
            "engine limits updated"
        );
        self.state.send_replace(LimitsState {
            limits: Some(snapshot.limits),
            source: Some(snapshot.source),
            fetched_at_ms: Some(now),
            error: None,
            loading: false,
        });
    }

    /// User-initiated retry; no cooldown
    pub async fn retry(&self) -> LimitsState {
        self.fetch_limits().await
    }

    /// Refresh when the view becomes visible again
    ///
    /// Returns `None` when skipped: hidden, already loading, or within the
    /// cooldown of the previous visibility refresh.
    pub async fn on_visibility_change(&self, visible: bool) -> Option<LimitsState> {
        if !visible || self.state.borrow().loading {
            return None;
        }
        {
            let mut last = self.last_visibility_fetch.lock();
            let cooldown = Duration::from_millis(self.config.visibility_cooldown_ms);
            let now = Instant::now();
            if last.is_some_and(|at| now.duration_since(at) < cooldown) {
                return None;
            }
            *last = Some(now);
        }
        Some(self.fetch_limits().await)
    }
}
