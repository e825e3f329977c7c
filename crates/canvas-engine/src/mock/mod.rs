//! Seeded mock analysis engine
//!
//! Implements the full adapter surface from built-in fixtures:
//! - Runs are planned deterministically from the request seed (see [`scenario`])
//! - Streams replay the plan with real `tokio::time` pacing
//! - Reads are served through a TTL [`ReadCache`] keyed by request identity

pub mod fixtures;
pub mod scenario;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canvas_model::{
    Clock, EngineLimits, ErrorDescriptor, LimitsSnapshot, Report, RunRequest, StreamEvent,
    SystemClock, TemplateDetail, TemplateList,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::adapter::{AdapterMode, AnalysisAdapter};
use crate::cache::{ReadCache, DEFAULT_TTL_MS};
use crate::stream::{EventSender, RunStream};

pub use scenario::{Branch, Scenario};

/// Limits advertised by the mock engine
pub const MOCK_LIMITS: EngineLimits = EngineLimits {
    max_nodes: 200,
    max_edges: 500,
    p95_budget_ms: Some(5_000),
};

/// Mock engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Lower latency bound
    pub latency_min_ms: u64,
    /// Upper latency bound, inclusive
    pub latency_max_ms: u64,
    /// Replace the drawn latency with a fixed delay
    pub fixed_delay_ms: Option<u64>,
    /// Spacing between progress ticks
    pub tick_interval_ms: u64,
    /// Read cache TTL
    pub read_ttl_ms: i64,
    /// Whether `stream_run` is offered
    pub streaming: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_min_ms: 120,
            latency_max_ms: 220,
            fixed_delay_ms: None,
            tick_interval_ms: 250,
            read_ttl_ms: DEFAULT_TTL_MS,
            streaming: true,
        }
    }
}

impl MockConfig {
    /// Set a fixed latency
    #[inline]
    #[must_use]
    pub fn with_fixed_delay_ms(mut self, ms: u64) -> Self {
        self.fixed_delay_ms = Some(ms);
        self
    }

    /// Disable streaming
    #[inline]
    #[must_use]
    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }
}

/// In-process analysis engine
#[derive(Debug, Clone)]
pub struct MockAdapter {
    config: MockConfig,
    cache: ReadCache,
}

impl MockAdapter {
    /// Engine using the system clock for cache expiry
    #[must_use]
    pub fn new(config: MockConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine judging cache expiry against `clock`
    #[must_use]
    pub fn with_clock(config: MockConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = ReadCache::with_clock(config.read_ttl_ms, clock);
        Self { config, cache }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Read cache
    #[must_use]
    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    /// Plan a run without executing it
    ///
    /// # Errors
    /// Returns `BAD_INPUT` for unknown templates
    pub async fn plan(&self, request: &RunRequest) -> Result<Scenario, ErrorDescriptor> {
        let template = self.template(&request.template_id).await?;
        scenario::plan(request, &template, &self.config)
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

async fn replay(scenario: Scenario, mut tx: EventSender, tick_interval: Duration) {
    let hello = StreamEvent::Hello {
        response_id: scenario.response_id.clone(),
    };
    if !tx.emit(hello).await || !tx.pause(scenario.latency).await {
        return;
    }
    let completion = match scenario.outcome {
        Ok(completion) => completion,
        Err(error) => {
            tx.emit(StreamEvent::Error(error)).await;
            return;
        }
    };
    for index in 1..=scenario.ticks {
        if index > 1 && !tx.pause(tick_interval).await {
            return;
        }
        if !tx.emit(StreamEvent::Tick { index }).await {
            return;
        }
        if index == 2 && !tx.emit(StreamEvent::Reconnected { attempt: 1 }).await {
            return;
        }
    }
    if tx.pause(tick_interval).await {
        tx.emit(StreamEvent::Done(Box::new(completion))).await;
    }
}

#[async_trait]
impl AnalysisAdapter for MockAdapter {
    fn mode(&self) -> AdapterMode {
        AdapterMode::Mock
    }

    async fn run(&self, request: &RunRequest) -> Result<Report, ErrorDescriptor> {
        let scenario = self.plan(request).await?;
        tracing::debug!(response_id = %scenario.response_id, branch = ?scenario.branch, "mock run");
        tokio::time::sleep(scenario.latency).await;
        scenario.outcome.map(|completion| completion.report)
    }

    fn supports_streaming(&self) -> bool {
        self.config.streaming
    }

    async fn stream_run(&self, request: &RunRequest) -> Result<RunStream, ErrorDescriptor> {
        if !self.config.streaming {
            return Err(ErrorDescriptor::server("mock streaming is disabled"));
        }
        let scenario = self.plan(request).await?;
        let span = tracing::debug_span!(
            "mock_stream",
            response_id = %scenario.response_id,
            seed = %scenario.seed,
            branch = ?scenario.branch,
        );
        let (tx, stream) = RunStream::channel();
        let tick_interval = Duration::from_millis(self.config.tick_interval_ms);
        tokio::spawn(replay(scenario, tx, tick_interval).instrument(span));
        Ok(stream)
    }

    async fn templates(&self) -> Result<Arc<TemplateList>, ErrorDescriptor> {
        let entry = self
            .cache
            .get_or_try_insert_with("templates", || async {
                Ok::<_, ErrorDescriptor>(fixtures::template_list())
            })
            .await?;
        Ok(Arc::clone(&entry.payload))
    }

    async fn template(&self, id: &str) -> Result<Arc<TemplateDetail>, ErrorDescriptor> {
        let key = format!("template:{id}");
        let entry = self
            .cache
            .get_or_try_insert_with(&key, || async {
                fixtures::template(id).ok_or_else(|| {
                    ErrorDescriptor::bad_input(format!("unknown template '{id}'"))
                        .with_fields(["template_id"])
                })
            })
            .await?;
        Ok(Arc::clone(&entry.payload))
    }

    async fn limits(&self) -> Result<LimitsSnapshot, ErrorDescriptor> {
        let entry = self
            .cache
            .get_or_try_insert_with("limits", || async {
                Ok::<_, ErrorDescriptor>(LimitsSnapshot::live(MOCK_LIMITS))
            })
            .await?;
        Ok(*entry.payload)
    }
}
