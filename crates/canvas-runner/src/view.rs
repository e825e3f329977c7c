//! Observable run slots
//!
//! Each orchestrator owns one slot: a `watch` channel holding the latest
//! [`RunView`]. Writers go through [`RunSlot`], which validates every status
//! change against the lifecycle table and ignores writes from runs that no
//! longer own the slot.

use std::sync::Arc;

use canvas_model::{
    ContentHash, ErrorDescriptor, Report, ReviewState, RunCompletion, RunDiagnostics,
};
use tokio::sync::watch;
use ulid::Ulid;

use crate::messages::{translate, UserMessage};
use crate::state_machine::{validate_transition, RunStatus};

/// Identifier of one run
pub type RunId = Ulid;

/// Transport metadata accumulated over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMeta {
    /// Diagnostics from the last completion that carried any
    pub diagnostics: Option<RunDiagnostics>,
    /// Backend ran degraded
    pub degraded: bool,
    /// Backend correlation id
    pub correlation_id: Option<String>,
    /// Stream resumes seen while running
    pub reconnects: u32,
}

impl RunMeta {
    /// Merge a completion's metadata; absent diagnostics never erase
    /// existing ones
    pub fn merge(&mut self, completion: &RunCompletion) {
        self.degraded |= completion.degraded;
        if let Some(diagnostics) = &completion.diagnostics {
            if diagnostics.correlation_id.is_some() {
                self.correlation_id.clone_from(&diagnostics.correlation_id);
            }
            self.diagnostics = Some(diagnostics.clone());
        }
    }
}

/// Latest state of a run slot
#[derive(Debug, Clone, Default)]
pub struct RunView {
    /// Run owning the slot
    pub run_id: Option<RunId>,
    /// Lifecycle status
    pub status: RunStatus,
    /// Published progress, 0..=100
    pub progress: u8,
    /// Backend response id from `Hello`
    pub response_id: Option<String>,
    /// Completion payload
    pub completion: Option<Arc<RunCompletion>>,
    /// Failure as reported
    pub error: Option<ErrorDescriptor>,
    /// Failure as shown to the user
    pub message: Option<UserMessage>,
    /// Transport metadata
    pub meta: RunMeta,
}

impl RunView {
    /// Report of a completed run
    #[must_use]
    pub fn report(&self) -> Option<&Report> {
        self.completion.as_deref().map(|c| &c.report)
    }

    /// Content hash of the report
    #[must_use]
    pub fn hash(&self) -> Option<ContentHash> {
        self.report().map(Report::hash)
    }

    /// Decision review of a completed run
    #[must_use]
    pub fn review(&self) -> Option<&ReviewState> {
        self.completion.as_deref().map(|c| &c.review)
    }
}

/// Validated writer for a run view channel
#[derive(Debug)]
pub struct RunSlot {
    tx: watch::Sender<RunView>,
}

impl RunSlot {
    /// Idle slot
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(RunView::default()),
        }
    }

    /// Observe the slot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunView> {
        self.tx.subscribe()
    }

    /// Current view
    #[must_use]
    pub fn snapshot(&self) -> RunView {
        self.tx.borrow().clone()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.tx.borrow().status
    }

    /// Hand the slot to a new run in `preparing`, resetting all metadata
    ///
    /// Returns `false` if the current status cannot move to `preparing`.
    pub fn begin(&self, run_id: RunId) -> bool {
        self.tx.send_if_modified(|view| {
            if let Err(err) = validate_transition(view.status, RunStatus::Preparing) {
                tracing::warn!(%run_id, "cannot start run: {err}");
                return false;
            }
            *view = RunView {
                run_id: Some(run_id),
                status: RunStatus::Preparing,
                ..RunView::default()
            };
            true
        })
    }

    /// Move `run_id`'s view to `to`, applying `apply` on success
    ///
    /// Ignored when another run owns the slot or the transition is illegal.
    pub fn transition(
        &self,
        run_id: RunId,
        to: RunStatus,
        apply: impl FnOnce(&mut RunView),
    ) -> bool {
        self.tx.send_if_modified(|view| {
            if view.run_id != Some(run_id) {
                return false;
            }
            if let Err(err) = validate_transition(view.status, to) {
                tracing::debug!(%run_id, "ignored: {err}");
                return false;
            }
            view.status = to;
            apply(view);
            true
        })
    }

    /// Mutate `run_id`'s view without changing status
    pub fn update(&self, run_id: RunId, apply: impl FnOnce(&mut RunView)) -> bool {
        self.tx.send_if_modified(|view| {
            if view.run_id != Some(run_id) || view.status.is_terminal() {
                return false;
            }
            apply(view);
            true
        })
    }

    /// Complete `run_id` with `completion`
    pub fn complete(&self, run_id: RunId, completion: Arc<RunCompletion>) -> bool {
        self.transition(run_id, RunStatus::Complete, |view| {
            view.progress = 100;
            view.meta.merge(&completion);
            view.completion = Some(completion);
        })
    }

    /// Fail `run_id` with `error`
    pub fn fail(&self, run_id: RunId, error: ErrorDescriptor) -> bool {
        self.transition(run_id, RunStatus::Error, |view| {
            view.message = Some(translate(&error));
            view.error = Some(error);
        })
    }

    /// Cancel `run_id`
    pub fn cancel(&self, run_id: RunId) -> bool {
        self.transition(run_id, RunStatus::Cancelled, |_| {})
    }

    /// Reset to `idle` from a terminal status
    pub fn clear(&self) -> bool {
        self.tx.send_if_modified(|view| {
            if validate_transition(view.status, RunStatus::Idle).is_err() {
                return false;
            }
            *view = RunView::default();
            true
        })
    }
}

impl Default for RunSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_model::{Confidence, ConfidenceLevel, ModelCard, ResultRanges};

    fn completion(diagnostics: Option<RunDiagnostics>, degraded: bool) -> RunCompletion {
        RunCompletion {
            report: Report {
                response_id: "r".into(),
                template_id: "t".into(),
                seed: 1,
                model_card: ModelCard {
                    response_hash: ContentHash::compute(b"r"),
                    template_version: "1".into(),
                },
                results: ResultRanges {
                    conservative: 1.0,
                    likely: 2.0,
                    optimistic: 3.0,
                    units: "GBP".into(),
                },
                confidence: Confidence {
                    level: ConfidenceLevel::Medium,
                    why: "x".into(),
                },
                drivers: Vec::new(),
            },
            diagnostics,
            degraded,
            review: ReviewState::Empty,
        }
    }

    #[test]
    fn meta_merge_never_erases() {
        let mut meta = RunMeta::default();
        meta.merge(&completion(
            Some(RunDiagnostics {
                resumes: 2,
                correlation_id: Some("c-1".into()),
                ..RunDiagnostics::default()
            }),
            true,
        ));
        meta.merge(&completion(None, false));
        assert!(meta.degraded);
        assert_eq!(meta.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(meta.diagnostics.as_ref().map(|d| d.resumes), Some(2));
    }

    #[test]
    fn stale_runs_cannot_write() {
        let slot = RunSlot::new();
        let old = Ulid::new();
        let new = Ulid::new();
        assert!(slot.begin(old));
        assert!(slot.cancel(old));
        assert!(slot.begin(new));
        assert!(!slot.complete(old, Arc::new(completion(None, false))));
        assert!(!slot.update(old, |v| v.progress = 50));
        assert_eq!(slot.snapshot().run_id, Some(new));
        assert_eq!(slot.snapshot().status, RunStatus::Preparing);
    }

    #[test]
    fn begin_resets_metadata() {
        let slot = RunSlot::new();
        let first = Ulid::new();
        slot.begin(first);
        slot.complete(first, Arc::new(completion(None, true)));
        assert!(slot.snapshot().meta.degraded);

        slot.begin(Ulid::new());
        let view = slot.snapshot();
        assert_eq!(view.meta, RunMeta::default());
        assert!(view.completion.is_none());
        assert_eq!(view.progress, 0);
    }

    #[test]
    fn illegal_transitions_are_ignored() {
        let slot = RunSlot::new();
        let id = Ulid::new();
        slot.begin(id);
        assert!(!slot.transition(id, RunStatus::Running, |_| {}));
        assert!(slot.fail(id, ErrorDescriptor::server("x")));
        assert!(!slot.cancel(id));
        assert_eq!(slot.snapshot().message.unwrap().title, "Analysis failed");
        assert!(slot.clear());
        assert_eq!(slot.snapshot().status, RunStatus::Idle);
    }
}
