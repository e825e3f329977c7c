//! Adapter selection and capability probe
//!
//! Decides, once per process, whether analysis runs go to the live backend
//! or the in-process mock:
//! - `mock` preference: mock outright, no probe
//! - `auto`: probe the live backend; available means live, otherwise mock
//! - `live`: live only; an unavailable backend fails runs with `NETWORK`
//!
//! Reads degrade per call. `templates` and `template` fall back to the mock
//! whenever the live call fails; every read goes to the mock while the probe
//! reports the backend unavailable. Runs never switch backend mid-flight.

use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use canvas_model::{
    Clock, ErrorDescriptor, LimitsSnapshot, Report, RunRequest, SystemClock, TemplateDetail,
    TemplateList,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterMode, AnalysisAdapter, HealthStatus};
use crate::error::EngineError;
use crate::http::HttpAdapter;
use crate::mock::{MockAdapter, MockConfig};
use crate::stream::RunStream;

/// Which backend the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterPreference {
    /// Probe and pick
    #[default]
    Auto,
    /// Live backend only
    Live,
    /// Mock only
    Mock,
}

impl Display for AdapterPreference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Live => "live",
            Self::Mock => "mock",
        })
    }
}

impl FromStr for AdapterPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "live" | "httpv1" => Ok(Self::Live),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown adapter preference '{other}'")),
        }
    }
}

/// Live adapter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Backend preference
    pub preference: AdapterPreference,
    /// Live backend base URL
    pub base_url: Option<String>,
    /// Bound on the capability probe
    pub probe_timeout_ms: u64,
    /// Bound on non-streaming requests
    pub request_timeout_ms: u64,
    /// Stream resumes allowed per run
    pub max_resumes: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            preference: AdapterPreference::Auto,
            base_url: None,
            probe_timeout_ms: 1_500,
            request_timeout_ms: 15_000,
            max_resumes: 2,
        }
    }
}

/// Outcome of the capability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Not probed yet, or no live backend configured
    Unknown,
    /// Backend answered the health check
    Available {
        /// Check time, epoch milliseconds
        checked_at_ms: i64,
        /// Round trip of the health check
        latency_ms: u64,
        /// Backend version, if reported
        version: Option<String>,
    },
    /// Backend unreachable, unhealthy or too slow
    Unavailable {
        /// Check time, epoch milliseconds
        checked_at_ms: i64,
        /// Why the probe failed
        reason: String,
    },
}

impl ProbeStatus {
    /// Whether the live backend may be used
    #[inline]
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// Supplies the adapter a run should use
#[async_trait]
pub trait AdapterSource: Send + Sync + std::fmt::Debug {
    /// Adapter for the next run
    ///
    /// # Errors
    /// Returns `NETWORK` when the required backend is unavailable
    async fn resolve(&self) -> Result<Arc<dyn AnalysisAdapter>, ErrorDescriptor>;
}

/// Source that always yields the same adapter
#[derive(Debug, Clone)]
pub struct FixedAdapter(pub Arc<dyn AnalysisAdapter>);

#[async_trait]
impl AdapterSource for FixedAdapter {
    async fn resolve(&self) -> Result<Arc<dyn AnalysisAdapter>, ErrorDescriptor> {
        Ok(Arc::clone(&self.0))
    }
}

/// Memoizing live/mock selector
#[derive(Debug)]
pub struct AdapterResolver {
    preference: AdapterPreference,
    live: Option<Arc<dyn AnalysisAdapter>>,
    mock: Arc<dyn AnalysisAdapter>,
    probe_timeout: Duration,
    clock: Arc<dyn Clock>,
    status: RwLock<ProbeStatus>,
    probe_lock: tokio::sync::Mutex<()>,
}

impl AdapterResolver {
    /// Resolver over explicit adapters
    #[must_use]
    pub fn new(
        preference: AdapterPreference,
        live: Option<Arc<dyn AnalysisAdapter>>,
        mock: Arc<dyn AnalysisAdapter>,
    ) -> Self {
        Self {
            preference,
            live,
            mock,
            probe_timeout: Duration::from_millis(AdapterConfig::default().probe_timeout_ms),
            clock: Arc::new(SystemClock),
            status: RwLock::new(ProbeStatus::Unknown),
            probe_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build the live and mock adapters from configuration
    ///
    /// # Errors
    /// Returns error for an invalid base URL, or a `live` preference with no
    /// base URL
    pub fn from_config(
        config: &AdapterConfig,
        mock: MockConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let live: Option<Arc<dyn AnalysisAdapter>> = match config.base_url.as_deref() {
            Some(url) if config.preference != AdapterPreference::Mock => {
                let http: Arc<dyn AnalysisAdapter> = Arc::new(HttpAdapter::new(
                    url,
                    Duration::from_millis(config.request_timeout_ms),
                    config.max_resumes,
                )?);
                Some(http)
            }
            None if config.preference == AdapterPreference::Live => {
                return Err(EngineError::MissingBaseUrl)
            }
            _ => None,
        };
        let mock = Arc::new(MockAdapter::with_clock(mock, Arc::clone(&clock)));
        Ok(Self::new(config.preference, live, mock)
            .with_probe_timeout(Duration::from_millis(config.probe_timeout_ms))
            .with_clock(clock))
    }

    /// Bound the health check
    #[inline]
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Clock used to stamp probe results
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured preference
    #[must_use]
    pub fn preference(&self) -> AdapterPreference {
        self.preference
    }

    /// Last probe result, without probing
    #[must_use]
    pub fn probe_status(&self) -> ProbeStatus {
        self.status.read().clone()
    }

    fn probing_enabled(&self) -> Option<&Arc<dyn AnalysisAdapter>> {
        match self.preference {
            AdapterPreference::Mock => None,
            _ => self.live.as_ref(),
        }
    }

    /// Probe once and memoize the result
    pub async fn ensure_probed(&self) -> ProbeStatus {
        let Some(live) = self.probing_enabled() else {
            return ProbeStatus::Unknown;
        };
        let current = self.probe_status();
        if current != ProbeStatus::Unknown {
            return current;
        }
        let _guard = self.probe_lock.lock().await;
        let current = self.probe_status();
        if current != ProbeStatus::Unknown {
            return current;
        }
        let status = self.probe(live.as_ref()).await;
        *self.status.write() = status.clone();
        status
    }

    /// Forget the memoized result and probe again
    pub async fn reprobe(&self) -> ProbeStatus {
        let Some(live) = self.probing_enabled() else {
            return ProbeStatus::Unknown;
        };
        let _guard = self.probe_lock.lock().await;
        let status = self.probe(live.as_ref()).await;
        *self.status.write() = status.clone();
        status
    }

    async fn probe(&self, live: &dyn AnalysisAdapter) -> ProbeStatus {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.probe_timeout, live.health()).await;
        let checked_at_ms = self.clock.now_ms();
        let status = match outcome {
            Ok(Ok(health)) if health.ok => ProbeStatus::Available {
                checked_at_ms,
                latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                version: health.version,
            },
            Ok(Ok(_)) => ProbeStatus::Unavailable {
                checked_at_ms,
                reason: "backend reported unhealthy".to_string(),
            },
            Ok(Err(err)) => ProbeStatus::Unavailable {
                checked_at_ms,
                reason: err.to_string(),
            },
            Err(_) => ProbeStatus::Unavailable {
                checked_at_ms,
                reason: format!("probe timed out after {}ms", self.probe_timeout.as_millis()),
            },
        };
        match &status {
            ProbeStatus::Available { latency_ms, .. } => {
                tracing::info!(latency_ms, "live analysis backend available");
            }
            ProbeStatus::Unavailable { reason, .. } => {
                tracing::warn!(%reason, preference = %self.preference, "live analysis backend unavailable");
            }
            ProbeStatus::Unknown => {}
        }
        status
    }

    /// Backend runs go to, probing if needed
    pub async fn adapter_mode(&self) -> AdapterMode {
        match (self.preference, &self.live) {
            (AdapterPreference::Mock, _) | (_, None) => AdapterMode::Mock,
            (AdapterPreference::Live, Some(_)) => AdapterMode::HttpV1,
            (AdapterPreference::Auto, Some(_)) => {
                if self.ensure_probed().await.is_available() {
                    AdapterMode::HttpV1
                } else {
                    AdapterMode::Mock
                }
            }
        }
    }

    async fn live_for_reads(&self) -> Option<Arc<dyn AnalysisAdapter>> {
        let live = self.probing_enabled()?;
        self.ensure_probed()
            .await
            .is_available()
            .then(|| Arc::clone(live))
    }

    async fn read_with_fallback<T, F, Fut>(
        &self,
        op: &'static str,
        call: F,
    ) -> Result<T, ErrorDescriptor>
    where
        F: Fn(Arc<dyn AnalysisAdapter>) -> Fut,
        Fut: Future<Output = Result<T, ErrorDescriptor>>,
    {
        if let Some(live) = self.live_for_reads().await {
            match call(live).await {
                Ok(value) => return Ok(value),
                Err(err) => tracing::warn!(op, %err, "live read failed, serving mock"),
            }
        }
        call(Arc::clone(&self.mock)).await
    }
}

#[async_trait]
impl AdapterSource for AdapterResolver {
    async fn resolve(&self) -> Result<Arc<dyn AnalysisAdapter>, ErrorDescriptor> {
        match (self.preference, &self.live) {
            (AdapterPreference::Mock, _) | (AdapterPreference::Auto, None) => {
                Ok(Arc::clone(&self.mock))
            }
            (AdapterPreference::Live, None) => Err(ErrorDescriptor::network(
                "live analysis backend requested but none is configured",
            )),
            (preference, Some(live)) => match self.ensure_probed().await {
                ProbeStatus::Available { .. } => Ok(Arc::clone(live)),
                _ if preference == AdapterPreference::Auto => Ok(Arc::clone(&self.mock)),
                ProbeStatus::Unavailable { reason, .. } => Err(ErrorDescriptor::network(format!(
                    "live analysis backend unavailable: {reason}"
                ))),
                ProbeStatus::Unknown => Err(ErrorDescriptor::network(
                    "live analysis backend has not been probed",
                )),
            },
        }
    }
}

#[async_trait]
impl AnalysisAdapter for AdapterResolver {
    fn mode(&self) -> AdapterMode {
        match (self.preference, &self.live) {
            (AdapterPreference::Mock, _) | (_, None) => AdapterMode::Mock,
            (AdapterPreference::Live, Some(_)) => AdapterMode::HttpV1,
            (AdapterPreference::Auto, Some(_)) if self.probe_status().is_available() => {
                AdapterMode::HttpV1
            }
            (AdapterPreference::Auto, Some(_)) => AdapterMode::Mock,
        }
    }

    async fn run(&self, request: &RunRequest) -> Result<Report, ErrorDescriptor> {
        self.resolve().await?.run(request).await
    }

    fn supports_streaming(&self) -> bool {
        match (self.mode(), &self.live) {
            (AdapterMode::HttpV1, Some(live)) => live.supports_streaming(),
            _ => self.mock.supports_streaming(),
        }
    }

    async fn stream_run(&self, request: &RunRequest) -> Result<RunStream, ErrorDescriptor> {
        self.resolve().await?.stream_run(request).await
    }

    async fn templates(&self) -> Result<Arc<TemplateList>, ErrorDescriptor> {
        self.read_with_fallback("templates", |adapter| async move { adapter.templates().await })
            .await
    }

    async fn template(&self, id: &str) -> Result<Arc<TemplateDetail>, ErrorDescriptor> {
        self.read_with_fallback("template", |adapter| async move { adapter.template(id).await })
            .await
    }

    async fn limits(&self) -> Result<LimitsSnapshot, ErrorDescriptor> {
        match self.live_for_reads().await {
            Some(live) => live.limits().await,
            None => self.mock.limits().await,
        }
    }

    async fn health(&self) -> Result<HealthStatus, ErrorDescriptor> {
        match self.probing_enabled() {
            Some(live) => live.health().await,
            None => self.mock.health().await,
        }
    }
}
