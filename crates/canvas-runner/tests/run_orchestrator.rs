//! Results run orchestration against scripted and mock adapters

use std::sync::Arc;
use std::time::Duration;

use canvas_engine::{AnalysisAdapter, FixedAdapter, MockConfig};
use canvas_model::{ErrorCode, LimitsSnapshot, RunRequest, Seed, StreamEvent};
use canvas_runner::telemetry::counters;
use canvas_runner::{LimitsFetcher, RecordingTelemetry, RunOrchestrator, RunStatus};
use canvas_test_utils::{
    chain_graph, limits, request, LimitsReply, ScriptedAdapter, StreamScript, SUCCESS_SEED,
};
use pretty_assertions::assert_eq;

struct Harness {
    adapter: Arc<ScriptedAdapter>,
    telemetry: Arc<RecordingTelemetry>,
    orchestrator: RunOrchestrator,
}

fn harness(adapter: ScriptedAdapter) -> Harness {
    let adapter = adapter
        .with_mock(MockConfig::default().with_fixed_delay_ms(50))
        .into_arc();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let dyn_adapter: Arc<dyn AnalysisAdapter> = adapter.clone();
    let orchestrator = RunOrchestrator::new(Arc::new(FixedAdapter(dyn_adapter)))
        .with_telemetry(telemetry.clone());
    Harness {
        adapter,
        telemetry,
        orchestrator,
    }
}

fn held_open() -> StreamScript {
    StreamScript::new(vec![
        StreamEvent::Hello {
            response_id: "held".into(),
        },
        StreamEvent::Tick { index: 1 },
    ])
    .held_open()
}

#[tokio::test(start_paused = true)]
async fn streaming_run_completes_with_metadata() {
    let h = harness(ScriptedAdapter::new());
    let mut rx = h.orchestrator.subscribe();

    let run_id = h.orchestrator.run(request(SUCCESS_SEED), false).await;
    assert_eq!(rx.borrow_and_update().status, RunStatus::Preparing);

    let view = h.orchestrator.wait().await;
    assert_eq!(view.run_id, Some(run_id));
    assert_eq!(view.status, RunStatus::Complete);
    assert_eq!(view.progress, 100);
    assert!(view.response_id.is_some());
    assert!(view.hash().is_some());
    assert_eq!(view.meta.reconnects, 1);
    assert!(view.meta.correlation_id.is_some());
    assert_eq!(view.report().map(|r| r.seed), Some(SUCCESS_SEED));
    assert_eq!(h.telemetry.count(counters::RUN_CLICKED), 1);
    assert_eq!(h.telemetry.count(counters::RUN_COMPLETED), 1);
}

#[tokio::test(start_paused = true)]
async fn new_run_cancels_the_in_flight_one() {
    let h = harness(ScriptedAdapter::new().with_stream_scripts(vec![held_open()]));

    let first = h.orchestrator.run(request(SUCCESS_SEED), false).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.orchestrator.view().status, RunStatus::Running);

    let second = h.orchestrator.run(request(1338), false).await;
    let view = h.orchestrator.wait().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(view.run_id, Some(second));
    assert_eq!(view.status, RunStatus::Complete);
    assert_eq!(h.adapter.stream_calls(), 2);

    let history = h.orchestrator.history();
    let superseded = history.iter().find(|e| e.run_id == first).unwrap();
    assert_eq!(superseded.status, RunStatus::Cancelled);
    assert_eq!(h.telemetry.count(counters::RUN_CANCELLED), 0);
    assert_eq!(h.telemetry.count(counters::RUN_COMPLETED), 1);
}

#[tokio::test(start_paused = true)]
async fn identical_request_reuses_completion_unless_forced() {
    let h = harness(ScriptedAdapter::new());

    h.orchestrator.run(request(SUCCESS_SEED), false).await;
    let first = h.orchestrator.wait().await;

    h.orchestrator.run(request(SUCCESS_SEED), false).await;
    let cached = h.orchestrator.wait().await;
    assert_eq!(h.adapter.stream_calls(), 1);
    assert_eq!(cached.status, RunStatus::Complete);
    assert_eq!(cached.hash(), first.hash());
    assert_eq!(h.telemetry.count(counters::RUN_CACHE_HIT), 1);
    assert_eq!(h.telemetry.count(counters::RUN_CLICKED), 1);

    h.orchestrator.run(request(SUCCESS_SEED), true).await;
    let forced = h.orchestrator.wait().await;
    assert_eq!(h.adapter.stream_calls(), 2);
    assert_eq!(
        h.adapter.requests().last().and_then(|r| r.seed),
        Some(Seed(SUCCESS_SEED + 1))
    );
    assert_ne!(forced.hash(), first.hash());
    assert_eq!(h.telemetry.count(counters::RUN_COMPLETED), 2);
    assert_eq!(h.telemetry.count(counters::RUN_CLICKED), 2);
    assert_eq!(h.telemetry.count(counters::RUN_CACHE_HIT), 1);
}

#[tokio::test(start_paused = true)]
async fn forced_run_without_seed_bumps_template_default() {
    let h = harness(ScriptedAdapter::new());

    h.orchestrator.run(RunRequest::new("hiring-v1"), true).await;
    h.orchestrator.wait().await;

    assert_eq!(
        h.adapter.requests().last().and_then(|r| r.seed),
        Some(Seed(2025))
    );
}

#[tokio::test(start_paused = true)]
async fn graph_over_known_limits_is_blocked_locally() {
    let h = harness(ScriptedAdapter::new().with_limits_replies(
        vec![],
        LimitsReply::Ok(LimitsSnapshot::live(limits(2, 1))),
    ));
    let fetcher = LimitsFetcher::new(h.adapter.clone());
    fetcher.fetch_limits().await;
    let orchestrator = h.orchestrator.with_limits(fetcher.subscribe());

    orchestrator
        .run(request(SUCCESS_SEED).with_graph(chain_graph(5)), false)
        .await;
    let view = orchestrator.wait().await;

    assert_eq!(view.status, RunStatus::Error);
    let err = view.error.unwrap();
    assert_eq!(err.code, ErrorCode::LimitExceeded);
    assert_eq!(err.fields, vec!["nodes", "edges"]);
    assert!(view.message.is_some());
    assert_eq!(h.adapter.stream_calls(), 0);
    assert_eq!(h.telemetry.count(counters::RUN_BLOCKED), 1);
    assert_eq!(h.telemetry.count(counters::RUN_FAILED), 0);
    assert_eq!(h.telemetry.count(counters::RUN_CLICKED), 0);
}

#[tokio::test(start_paused = true)]
async fn graph_within_limits_runs() {
    let h = harness(ScriptedAdapter::new());
    let fetcher = LimitsFetcher::new(h.adapter.clone());
    fetcher.fetch_limits().await;
    let orchestrator = h.orchestrator.with_limits(fetcher.subscribe());

    orchestrator
        .run(request(SUCCESS_SEED).with_graph(chain_graph(5)), false)
        .await;

    assert_eq!(orchestrator.wait().await.status, RunStatus::Complete);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent() {
    let h = harness(ScriptedAdapter::new().with_stream_scripts(vec![held_open()]));

    h.orchestrator.run(request(SUCCESS_SEED), false).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(h.orchestrator.cancel());
    assert!(!h.orchestrator.cancel());
    let view = h.orchestrator.wait().await;
    assert_eq!(view.status, RunStatus::Cancelled);
    assert_eq!(h.telemetry.count(counters::RUN_CANCELLED), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_completion_is_a_no_op() {
    let h = harness(ScriptedAdapter::new());

    h.orchestrator.run(request(SUCCESS_SEED), false).await;
    h.orchestrator.wait().await;

    assert!(!h.orchestrator.cancel());
    assert_eq!(h.orchestrator.view().status, RunStatus::Complete);
    assert_eq!(h.telemetry.count(counters::RUN_CANCELLED), 0);

    assert!(h.orchestrator.clear());
    assert_eq!(h.orchestrator.view().status, RunStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn terminal_error_keeps_retry_hint() {
    let h = harness(ScriptedAdapter::new());

    h.orchestrator.run(request(29), false).await;
    let view = h.orchestrator.wait().await;

    assert_eq!(view.status, RunStatus::Error);
    let err = view.error.unwrap();
    assert_eq!(err.code, ErrorCode::RateLimited);
    let message = view.message.unwrap();
    assert_eq!(message.retry_after, err.retry_after);
    assert!(message.retry_after.is_some());
    assert_eq!(h.telemetry.count(counters::RUN_FAILED), 1);
}

#[tokio::test(start_paused = true)]
async fn non_streaming_adapter_runs_once() {
    let h = harness(ScriptedAdapter::new().without_streaming());

    h.orchestrator.run(request(SUCCESS_SEED), false).await;
    let view = h.orchestrator.wait().await;

    assert_eq!(view.status, RunStatus::Complete);
    assert_eq!(h.adapter.run_calls(), 1);
    assert_eq!(h.adapter.stream_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn history_records_each_finished_run() {
    let h = harness(ScriptedAdapter::new());

    for seed in [SUCCESS_SEED, 31] {
        h.orchestrator.run(request(seed), false).await;
        h.orchestrator.wait().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;

    let history = h.orchestrator.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, RunStatus::Complete);
    assert!(history[0].hash.is_some());
    assert_eq!(history[1].status, RunStatus::Error);
    assert_eq!(history[1].error_code, Some(ErrorCode::LimitExceeded));
}
