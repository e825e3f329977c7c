//! Testing utilities for the decision canvas workspace
//!
//! Shared fixtures and a scripted adapter that records every call.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canvas_engine::mock::fixtures;
use canvas_engine::{AdapterMode, AnalysisAdapter, MockAdapter, MockConfig, RunStream};
use canvas_model::{
    Edge, EngineLimits, ErrorDescriptor, Graph, LimitsSnapshot, Node, NodeKind, Report,
    RunCompletion, RunRequest, StreamEvent, TemplateDetail, TemplateList,
};
use parking_lot::Mutex;
use serde_json::json;

pub const TEMPLATE_ID: &str = "pricing-v1";

/// Seed that takes the mock's success branch
pub const SUCCESS_SEED: u64 = 1337;

pub fn request(seed: u64) -> RunRequest {
    RunRequest::new(TEMPLATE_ID).with_seed(seed)
}

pub fn pricing_graph() -> Graph {
    fixtures::template(TEMPLATE_ID).unwrap().graph
}

/// `n` nodes connected in a line: `n0 -> n1 -> ...`
pub fn chain_graph(n: usize) -> Graph {
    let nodes = (0..n)
        .map(|i| Node::new(format!("n{i}"), NodeKind::Factor, format!("Node {i}")))
        .collect();
    let edges = (1..n)
        .map(|i| Edge::new(format!("e{i}"), format!("n{}", i - 1), format!("n{i}")))
        .collect();
    Graph::new(nodes, edges)
}

/// Node carrying framework-internal junk alongside real data
pub fn node_with_junk(id: &str, label: &str) -> Node {
    let mut node = Node::new(id, NodeKind::Option, label);
    node.data.extra.insert("score".into(), json!(0.5));
    node.data.extra.insert("__reactFiber$x".into(), json!({"tag": 5}));
    node.data.extra.insert("_owner".into(), json!(null));
    node.data.extra.insert("el".into(), json!({"nodeType": 1, "nodeName": "DIV"}));
    node
}

pub fn limits(max_nodes: u32, max_edges: u32) -> EngineLimits {
    EngineLimits {
        max_nodes,
        max_edges,
        p95_budget_ms: Some(1_000),
    }
}

/// Report the mock produces for `seed`
pub async fn mock_report(seed: u64) -> Report {
    MockAdapter::new(MockConfig::default().with_fixed_delay_ms(0))
        .run(&request(seed))
        .await
        .unwrap()
}

/// Scripted reply of `limits()`
#[derive(Debug, Clone)]
pub enum LimitsReply {
    Ok(LimitsSnapshot),
    Err(ErrorDescriptor),
    /// Never answers
    Hang,
}

/// Scripted event stream
#[derive(Debug, Clone)]
pub struct StreamScript {
    pub events: Vec<StreamEvent>,
    /// Delay before each event
    pub gap: Duration,
    /// Keep the stream open after the last event
    pub hold_open: bool,
}

impl StreamScript {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            gap: Duration::ZERO,
            hold_open: false,
        }
    }

    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// `hello`, `ticks` ticks, then `done` with `completion`
    pub fn success(ticks: u32, completion: RunCompletion) -> Self {
        let mut events = vec![StreamEvent::Hello {
            response_id: completion.report.response_id.clone(),
        }];
        events.extend((1..=ticks).map(|index| StreamEvent::Tick { index }));
        events.push(StreamEvent::Done(Box::new(completion)));
        Self::new(events)
    }
}

/// Adapter that records calls and replays scripts, delegating the rest to
/// the mock engine
#[derive(Debug)]
pub struct ScriptedAdapter {
    mock: MockAdapter,
    streaming: bool,
    limits_replies: Mutex<VecDeque<LimitsReply>>,
    default_limits: LimitsReply,
    stream_scripts: Mutex<VecDeque<StreamScript>>,
    requests: Mutex<Vec<RunRequest>>,
    run_calls: AtomicU32,
    stream_calls: AtomicU32,
    limits_calls: AtomicU32,
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            mock: MockAdapter::default(),
            streaming: true,
            limits_replies: Mutex::new(VecDeque::new()),
            default_limits: LimitsReply::Ok(LimitsSnapshot::live(limits(200, 500))),
            stream_scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            run_calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
            limits_calls: AtomicU32::new(0),
        }
    }

    pub fn with_mock(mut self, config: MockConfig) -> Self {
        self.mock = MockAdapter::new(config);
        self
    }

    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// Replies used in order, then `default`
    pub fn with_limits_replies(mut self, replies: Vec<LimitsReply>, default: LimitsReply) -> Self {
        self.limits_replies = Mutex::new(replies.into());
        self.default_limits = default;
        self
    }

    /// Scripts used by successive `stream_run` calls, then the mock
    pub fn with_stream_scripts(mut self, scripts: Vec<StreamScript>) -> Self {
        self.stream_scripts = Mutex::new(scripts.into());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn run_calls(&self) -> u32 {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> u32 {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn limits_calls(&self) -> u32 {
        self.limits_calls.load(Ordering::SeqCst)
    }

    /// Every run and stream request, in call order
    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AnalysisAdapter for ScriptedAdapter {
    fn mode(&self) -> AdapterMode {
        AdapterMode::Mock
    }

    async fn run(&self, request: &RunRequest) -> Result<Report, ErrorDescriptor> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        self.mock.run(request).await
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn stream_run(&self, request: &RunRequest) -> Result<RunStream, ErrorDescriptor> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let script = self.stream_scripts.lock().pop_front();
        let Some(script) = script else {
            return self.mock.stream_run(request).await;
        };
        let (mut tx, stream) = RunStream::channel();
        tokio::spawn(async move {
            for event in script.events {
                if !script.gap.is_zero() && !tx.pause(script.gap).await {
                    return;
                }
                if !tx.emit(event).await {
                    return;
                }
            }
            if script.hold_open {
                tx.cancelled().await;
            }
        });
        Ok(stream)
    }

    async fn templates(&self) -> Result<Arc<TemplateList>, ErrorDescriptor> {
        self.mock.templates().await
    }

    async fn template(&self, id: &str) -> Result<Arc<TemplateDetail>, ErrorDescriptor> {
        self.mock.template(id).await
    }

    async fn limits(&self) -> Result<LimitsSnapshot, ErrorDescriptor> {
        self.limits_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .limits_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_limits.clone());
        match reply {
            LimitsReply::Ok(snapshot) => Ok(snapshot),
            LimitsReply::Err(err) => Err(err),
            LimitsReply::Hang => std::future::pending().await,
        }
    }
}
