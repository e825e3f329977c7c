//! Live backend adapter over HTTP and server-sent events
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /v1/run`, `POST /v1/stream` (SSE)
//! - `GET /v1/templates`, `GET /v1/templates/{id}`
//! - `GET /v1/limits` (404 means "no live limits", served as fallback)
//! - `GET /v1/health`
//!
//! A dropped event stream is resumed with `Last-Event-ID`, at most
//! `max_resumes` times per run, each resume surfaced as a `Reconnected` event.

pub mod sse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canvas_model::{
    ErrorCode, ErrorDescriptor, LimitsSnapshot, Report, RunRequest, StreamEvent, TemplateDetail,
    TemplateList,
};
use futures::StreamExt;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::Instrument;

use crate::adapter::{AdapterMode, AnalysisAdapter, HealthStatus};
use crate::error::EngineError;
use crate::stream::{EventSender, RunStream};

pub use sse::{SseDecoder, SseFrame};

/// Header carrying the resume cursor
pub const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Delay before each resume attempt, multiplied by the attempt number
const RESUME_BACKOFF: Duration = Duration::from_millis(500);

/// Connection establishment bound
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the live analysis backend
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
    max_resumes: u32,
}

impl HttpAdapter {
    /// Build a client for `base_url`
    ///
    /// # Errors
    /// Returns error if the URL is not absolute http(s) or the client cannot
    /// be constructed
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        max_resumes: u32,
    ) -> Result<Self, EngineError> {
        let trimmed = base_url.trim_end_matches('/');
        let parsed = Url::parse(&format!("{trimmed}/"))
            .map_err(|_| EngineError::InvalidBaseUrl(base_url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EngineError::InvalidBaseUrl(base_url.to_string()));
        }
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: parsed,
            request_timeout,
            max_resumes,
        })
    }

    /// Base URL, always ending in `/`
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ErrorDescriptor> {
        self.base_url
            .join(path)
            .map_err(|err| ErrorDescriptor::network(format!("invalid endpoint '{path}': {err}")))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ErrorDescriptor> {
        let response = builder.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ErrorDescriptor> {
        let builder = self.client.get(self.url(path)?).timeout(self.request_timeout);
        let response = self.send(builder).await?;
        response.json().await.map_err(decode_error)
    }

    async fn open_stream(
        &self,
        request: &RunRequest,
        last_event_id: Option<&str>,
    ) -> Result<Response, ErrorDescriptor> {
        let mut builder = self
            .client
            .post(self.url("v1/stream")?)
            .header(ACCEPT, "text/event-stream")
            .json(request);
        if let Some(id) = last_event_id {
            builder = builder.header(LAST_EVENT_ID, id);
        }
        self.send(builder).await
    }
}

fn transport_error(err: reqwest::Error) -> ErrorDescriptor {
    if err.is_timeout() {
        ErrorDescriptor::timeout(format!("analysis backend timed out: {err}"))
    } else {
        ErrorDescriptor::network(format!("analysis backend unreachable: {err}"))
    }
}

fn decode_error(err: reqwest::Error) -> ErrorDescriptor {
    if err.is_timeout() {
        transport_error(err)
    } else {
        ErrorDescriptor::server(format!("malformed backend response: {err}"))
    }
}

/// Taxonomy code for an HTTP status without a structured body
#[must_use]
pub fn code_for_status(status: StatusCode) -> ErrorCode {
    match status.as_u16() {
        400 | 422 => ErrorCode::BadInput,
        413 => ErrorCode::LimitExceeded,
        429 => ErrorCode::RateLimited,
        408 | 504 => ErrorCode::Timeout,
        _ => ErrorCode::ServerError,
    }
}

async fn error_from_response(response: Response) -> ErrorDescriptor {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u32>().ok());
    let body = response.bytes().await.ok();
    let mut descriptor = body
        .and_then(|bytes| serde_json::from_slice::<ErrorDescriptor>(&bytes).ok())
        .unwrap_or_else(|| {
            ErrorDescriptor::new(code_for_status(status), format!("backend returned {status}"))
        });
    if descriptor.retry_after.is_none() {
        descriptor.retry_after = retry_after;
    }
    descriptor
}

enum Drained {
    Finished,
    Dropped(String),
}

/// Forwards one SSE response body at a time into the run stream
struct Pump {
    adapter: HttpAdapter,
    request: RunRequest,
    tx: EventSender,
    last_event_id: Option<String>,
    resumes: u32,
    recovered: u32,
}

impl Pump {
    async fn run(mut self, first: Response) {
        let mut response = Some(first);
        loop {
            let outcome = match response.take() {
                Some(resp) => self.drain(resp).await,
                None => Drained::Dropped("resume request failed".to_string()),
            };
            let Drained::Dropped(reason) = outcome else {
                return;
            };
            if self.tx.is_cancelled() {
                return;
            }
            if self.resumes >= self.adapter.max_resumes {
                let message = format!(
                    "event stream lost after {} resumes: {reason}",
                    self.resumes
                );
                self.tx
                    .emit(StreamEvent::Error(ErrorDescriptor::network(message)))
                    .await;
                return;
            }
            self.resumes += 1;
            tracing::warn!(attempt = self.resumes, %reason, "event stream dropped, resuming");
            if !self.tx.pause(RESUME_BACKOFF * self.resumes).await {
                return;
            }
            match self
                .adapter
                .open_stream(&self.request, self.last_event_id.as_deref())
                .await
            {
                Ok(resp) => {
                    let reconnected = StreamEvent::Reconnected {
                        attempt: self.resumes,
                    };
                    if !self.tx.emit(reconnected).await {
                        return;
                    }
                    response = Some(resp);
                }
                Err(err) if err.code.is_transport() => {
                    tracing::debug!(attempt = self.resumes, "resume failed: {err}");
                }
                Err(err) => {
                    self.tx.emit(StreamEvent::Error(err)).await;
                    return;
                }
            }
        }
    }

    async fn drain(&mut self, response: Response) -> Drained {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                () = self.tx.cancelled() => return Drained::Finished,
                next = body.next() => next,
            };
            match next {
                Some(Ok(bytes)) => {
                    for frame in decoder.push(&bytes) {
                        if self.deliver(frame).await {
                            return Drained::Finished;
                        }
                    }
                }
                Some(Err(err)) => return Drained::Dropped(err.to_string()),
                None => {
                    if let Some(frame) = decoder.finish() {
                        if self.deliver(frame).await {
                            return Drained::Finished;
                        }
                    }
                    return Drained::Dropped("stream ended before a terminal event".to_string());
                }
            }
        }
    }

    /// Forward one frame; `true` once the pump should stop
    async fn deliver(&mut self, frame: SseFrame) -> bool {
        if let Some(id) = frame.id.as_ref() {
            self.last_event_id = Some(id.clone());
        }
        let Some(mut event) = frame.to_event() else {
            return false;
        };
        match &mut event {
            StreamEvent::Hello { .. } if self.tx.hello_sent() => return false,
            StreamEvent::Done(completion) if self.resumes > 0 => {
                let diagnostics = completion.diagnostics.get_or_insert_with(Default::default);
                diagnostics.resumes = diagnostics.resumes.max(self.resumes);
                diagnostics.recovered_events = diagnostics.recovered_events.max(self.recovered);
            }
            _ if self.resumes > 0 => self.recovered += 1,
            _ => {}
        }
        if !self.tx.emit(event).await {
            return self.tx.is_cancelled() || self.tx.is_finished();
        }
        self.tx.is_finished()
    }
}

#[async_trait]
impl AnalysisAdapter for HttpAdapter {
    fn mode(&self) -> AdapterMode {
        AdapterMode::HttpV1
    }

    async fn run(&self, request: &RunRequest) -> Result<Report, ErrorDescriptor> {
        let builder = self
            .client
            .post(self.url("v1/run")?)
            .timeout(self.request_timeout)
            .json(request);
        let response = self.send(builder).await?;
        response.json().await.map_err(decode_error)
    }

    async fn stream_run(&self, request: &RunRequest) -> Result<RunStream, ErrorDescriptor> {
        let response = self.open_stream(request, None).await?;
        let (tx, stream) = RunStream::channel();
        let pump = Pump {
            adapter: self.clone(),
            request: request.clone(),
            tx,
            last_event_id: None,
            resumes: 0,
            recovered: 0,
        };
        let span = tracing::debug_span!("http_stream", template_id = %request.template_id);
        tokio::spawn(pump.run(response).instrument(span));
        Ok(stream)
    }

    async fn templates(&self) -> Result<Arc<TemplateList>, ErrorDescriptor> {
        self.get_json("v1/templates").await.map(Arc::new)
    }

    async fn template(&self, id: &str) -> Result<Arc<TemplateDetail>, ErrorDescriptor> {
        self.get_json(&format!("v1/templates/{id}"))
            .await
            .map(Arc::new)
    }

    async fn limits(&self) -> Result<LimitsSnapshot, ErrorDescriptor> {
        let builder = self
            .client
            .get(self.url("v1/limits")?)
            .timeout(self.request_timeout);
        let response = builder.send().await.map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!("backend publishes no limits, using fallback");
            return Ok(LimitsSnapshot::fallback());
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        response
            .json()
            .await
            .map(LimitsSnapshot::live)
            .map_err(decode_error)
    }

    async fn health(&self) -> Result<HealthStatus, ErrorDescriptor> {
        let builder = self
            .client
            .get(self.url("v1/health")?)
            .timeout(self.request_timeout);
        let response = self.send(builder).await?;
        let version = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("version").and_then(|v| v.as_str()).map(str::to_string));
        Ok(HealthStatus { ok: true, version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_validation() {
        assert!(HttpAdapter::new("ftp://plot.local", Duration::from_secs(1), 2).is_err());
        assert!(HttpAdapter::new("not a url", Duration::from_secs(1), 2).is_err());
        let adapter = HttpAdapter::new("https://plot.local/api/", Duration::from_secs(1), 2).unwrap();
        assert_eq!(adapter.base_url().as_str(), "https://plot.local/api/");
        assert_eq!(
            adapter.url("v1/templates/pricing-v1").unwrap().as_str(),
            "https://plot.local/api/v1/templates/pricing-v1"
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(code_for_status(StatusCode::BAD_REQUEST), ErrorCode::BadInput);
        assert_eq!(code_for_status(StatusCode::PAYLOAD_TOO_LARGE), ErrorCode::LimitExceeded);
        assert_eq!(code_for_status(StatusCode::TOO_MANY_REQUESTS), ErrorCode::RateLimited);
        assert_eq!(code_for_status(StatusCode::GATEWAY_TIMEOUT), ErrorCode::Timeout);
        assert_eq!(code_for_status(StatusCode::BAD_GATEWAY), ErrorCode::ServerError);
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        let adapter = HttpAdapter::new("http://127.0.0.1:9", Duration::from_secs(2), 0).unwrap();
        let err = adapter.templates().await.unwrap_err();
        assert!(err.code.is_transport(), "{err}");
    }
}
