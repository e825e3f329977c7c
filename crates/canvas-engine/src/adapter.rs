//! The analysis adapter seam
//!
//! Live and mock backends expose the same async surface. Orchestrators never
//! know which one they hold.

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use canvas_model::{
    ErrorCode, ErrorDescriptor, LimitsSnapshot, Report, RunRequest, TemplateDetail, TemplateList,
};
use serde::{Deserialize, Serialize};

use crate::stream::RunStream;

/// Which backend an adapter talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    /// Live HTTP/SSE backend
    #[serde(rename = "httpv1")]
    HttpV1,
    /// In-process seeded mock
    Mock,
}

impl AdapterMode {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpV1 => "httpv1",
            Self::Mock => "mock",
        }
    }
}

impl Display for AdapterMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend health as reported by `GET /v1/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Backend reports itself healthy
    pub ok: bool,
    /// Backend version string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Analysis backend
///
/// Every method returns domain failures as [`ErrorDescriptor`]. Reads return
/// shared payloads so callers can compare cache hits by pointer.
#[async_trait]
pub trait AnalysisAdapter: Send + Sync + Debug {
    /// Backend this adapter talks to
    fn mode(&self) -> AdapterMode;

    /// Run to completion and return the report
    async fn run(&self, request: &RunRequest) -> Result<Report, ErrorDescriptor>;

    /// Whether `stream_run` is available
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Start a streaming run
    ///
    /// Errors returned here are setup failures; failures after the run is
    /// accepted arrive as a terminal `Error` event on the stream.
    async fn stream_run(&self, request: &RunRequest) -> Result<RunStream, ErrorDescriptor> {
        let _ = request;
        Err(ErrorDescriptor::new(
            ErrorCode::ServerError,
            format!("{} adapter does not support streaming", self.mode()),
        ))
    }

    /// List templates
    async fn templates(&self) -> Result<Arc<TemplateList>, ErrorDescriptor>;

    /// Fetch one template
    async fn template(&self, id: &str) -> Result<Arc<TemplateDetail>, ErrorDescriptor>;

    /// Fetch engine limits
    async fn limits(&self) -> Result<LimitsSnapshot, ErrorDescriptor>;

    /// Lightweight liveness check
    async fn health(&self) -> Result<HealthStatus, ErrorDescriptor> {
        Ok(HealthStatus {
            ok: true,
            version: None,
        })
    }
}
