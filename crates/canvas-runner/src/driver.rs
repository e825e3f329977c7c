//! Shared run driver
//!
//! Resolves an adapter, dispatches the request (streaming, or the
//! non-streaming fallback) and folds stream events into a [`RunSlot`].
//! Terminal outcomes are returned to the caller, which owns the final
//! transition, caching and telemetry.

use std::sync::Arc;
use std::time::Duration;

use canvas_engine::{AdapterSource, CancelHandle, RunStream};
use canvas_model::{ErrorDescriptor, RunCompletion, RunRequest, StreamEvent};
use tokio::time::Instant;

use crate::state_machine::RunStatus;
use crate::view::{RunId, RunSlot};

/// Progress ceiling before completion
pub const MAX_RUNNING_PROGRESS: u8 = 90;

/// Ticks that map to the progress ceiling
const TICKS_TO_CEILING: f64 = 5.0;

/// Progress for the `index`-th tick: `min(90, round(index / 5 * 90))`
#[must_use]
pub fn progress_for_tick(index: u32) -> u8 {
    let scaled = (f64::from(index) / TICKS_TO_CEILING * f64::from(MAX_RUNNING_PROGRESS)).round();
    if scaled >= f64::from(MAX_RUNNING_PROGRESS) {
        MAX_RUNNING_PROGRESS
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let progress = scaled as u8;
        progress
    }
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Report delivered
    Completed(Arc<RunCompletion>),
    /// Terminal error or setup failure
    Failed(ErrorDescriptor),
    /// Cancelled before a terminal event
    Cancelled,
}

impl RunOutcome {
    /// Short name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Timing knobs for a driven run
#[derive(Debug, Clone, Copy)]
pub struct DriveTiming {
    /// Minimum spacing between progress publications
    pub throttle: Duration,
    /// Delay before a non-streaming run is dispatched
    pub prepare_delay: Duration,
}

/// Sleep unless cancelled; `false` on cancellation
async fn pause(cancel: &CancelHandle, duration: Duration) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => !cancel.is_cancelled(),
    }
}

/// Dispatch `request` and drive it to a terminal outcome
pub async fn execute(
    source: &dyn AdapterSource,
    request: &RunRequest,
    run_id: RunId,
    slot: &RunSlot,
    cancel: &CancelHandle,
    timing: DriveTiming,
) -> RunOutcome {
    let adapter = tokio::select! {
        biased;
        () = cancel.cancelled() => return RunOutcome::Cancelled,
        resolved = source.resolve() => match resolved {
            Ok(adapter) => adapter,
            Err(err) => return RunOutcome::Failed(err),
        },
    };

    if !adapter.supports_streaming() {
        tracing::debug!(%run_id, mode = %adapter.mode(), "adapter cannot stream, running once");
        if !pause(cancel, timing.prepare_delay).await {
            return RunOutcome::Cancelled;
        }
        return tokio::select! {
            biased;
            () = cancel.cancelled() => RunOutcome::Cancelled,
            result = adapter.run(request) => match result {
                Ok(report) => RunOutcome::Completed(Arc::new(RunCompletion::plain(report))),
                Err(err) => RunOutcome::Failed(err),
            },
        };
    }

    let stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return RunOutcome::Cancelled,
        opened = adapter.stream_run(request) => match opened {
            Ok(stream) => stream,
            Err(err) => return RunOutcome::Failed(err),
        },
    };
    drive(stream, run_id, slot, cancel, timing.throttle).await
}

/// Fold a stream's events into `slot` until a terminal event
pub async fn drive(
    mut stream: RunStream,
    run_id: RunId,
    slot: &RunSlot,
    cancel: &CancelHandle,
    throttle: Duration,
) -> RunOutcome {
    let mut last_publish: Option<Instant> = None;
    let mut pending: Option<u8> = None;

    loop {
        let flush_at = pending.and(last_publish).map(|at| at + throttle);
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stream.cancel();
                return RunOutcome::Cancelled;
            }
            () = sleep_until_opt(flush_at) => {
                if let Some(progress) = pending.take() {
                    slot.update(run_id, |view| view.progress = progress);
                    last_publish = Some(Instant::now());
                }
                continue;
            }
            event = stream.next() => event,
        };

        let Some(event) = event else {
            if cancel.is_cancelled() {
                return RunOutcome::Cancelled;
            }
            return RunOutcome::Failed(ErrorDescriptor::network(
                "event stream ended before the run finished",
            ));
        };
        tracing::debug!(%run_id, event = event.name(), "stream event");

        match event {
            StreamEvent::Hello { response_id } => {
                slot.transition(run_id, RunStatus::Connecting, |view| {
                    view.response_id = Some(response_id);
                });
            }
            StreamEvent::Tick { index } => {
                let progress = progress_for_tick(index);
                let now = Instant::now();
                if slot.status() == RunStatus::Connecting {
                    slot.transition(run_id, RunStatus::Running, |view| view.progress = progress);
                    last_publish = Some(now);
                    pending = None;
                } else if last_publish.map_or(true, |at| now.duration_since(at) >= throttle) {
                    slot.update(run_id, |view| view.progress = progress);
                    last_publish = Some(now);
                    pending = None;
                } else {
                    pending = Some(progress);
                }
            }
            StreamEvent::Reconnected { attempt } => {
                slot.update(run_id, |view| view.meta.reconnects = attempt);
            }
            StreamEvent::Done(completion) => {
                return RunOutcome::Completed(Arc::new(*completion));
            }
            StreamEvent::Error(err) => return RunOutcome::Failed(err),
        }
    }
}

/// Apply a terminal outcome to `slot`; `false` if the run no longer owns it
/// or already ended
pub fn settle(slot: &RunSlot, run_id: RunId, outcome: &RunOutcome) -> bool {
    let applied = match outcome {
        RunOutcome::Completed(completion) => slot.complete(run_id, Arc::clone(completion)),
        RunOutcome::Failed(err) => slot.fail(run_id, err.clone()),
        RunOutcome::Cancelled => slot.cancel(run_id),
    };
    if applied {
        tracing::info!(%run_id, outcome = outcome.name(), "run settled");
    }
    applied
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use canvas_engine::{FixedAdapter, MockAdapter, MockConfig};
    use ulid::Ulid;

    #[test]
    fn progress_mapping() {
        assert_eq!(progress_for_tick(0), 0);
        assert_eq!(progress_for_tick(1), 18);
        assert_eq!(progress_for_tick(2), 36);
        assert_eq!(progress_for_tick(5), 90);
        assert_eq!(progress_for_tick(7), 90);
    }

    fn timing() -> DriveTiming {
        DriveTiming {
            throttle: Duration::from_millis(100),
            prepare_delay: Duration::from_millis(200),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_publishes_latest_value() {
        let slot = RunSlot::new();
        let run_id = Ulid::new();
        slot.begin(run_id);
        let (mut tx, stream) = RunStream::channel();
        let cancel = CancelHandle::new();

        let mut rx = slot.subscribe();
        let driver = {
            let cancel = cancel.clone();
            async move { drive(stream, run_id, &slot, &cancel, Duration::from_millis(100)).await }
        };
        let handle = tokio::spawn(driver);

        tx.emit(StreamEvent::Hello { response_id: "r".into() }).await;
        for index in 1..=4 {
            tx.emit(StreamEvent::Tick { index }).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rx.borrow_and_update().progress, 18, "burst coalesced behind first tick");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.borrow_and_update().progress, 72, "trailing flush publishes the latest");

        cancel.cancel();
        assert!(matches!(handle.await.unwrap(), RunOutcome::Cancelled));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn non_streaming_adapter_completes_from_preparing() {
        let slot = RunSlot::new();
        let run_id = Ulid::new();
        slot.begin(run_id);
        let adapter = MockAdapter::new(MockConfig::default().without_streaming());
        let source = FixedAdapter(Arc::new(adapter));
        let started = Instant::now();

        let outcome = execute(
            &source,
            &RunRequest::new("pricing-v1").with_seed(1u64),
            run_id,
            &slot,
            &CancelHandle::new(),
            timing(),
        )
        .await;
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(slot.snapshot().status, RunStatus::Preparing);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_without_terminal_is_a_failure() {
        let slot = RunSlot::new();
        let run_id = Ulid::new();
        slot.begin(run_id);
        let stream = RunStream::from_events([StreamEvent::Hello { response_id: "r".into() }]);
        let cancel = CancelHandle::new();
        let outcome = drive(stream, run_id, &slot, &cancel, Duration::from_millis(100)).await;
        match outcome {
            RunOutcome::Failed(err) => assert!(err.code.is_transport()),
            other => panic!("unexpected {}", other.name()),
        }
        assert_eq!(slot.snapshot().status, RunStatus::Connecting);
        assert_eq!(slot.snapshot().response_id.as_deref(), Some("r"));
    }

    proptest! {
        #[test]
        fn tick_progress_is_monotonic_and_capped(index in 0u32..10_000) {
            let here = progress_for_tick(index);
            prop_assert!(here <= MAX_RUNNING_PROGRESS);
            prop_assert!(progress_for_tick(index + 1) >= here);
        }
    }
}
