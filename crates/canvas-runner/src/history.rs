//! Bounded history of finished runs

use std::collections::VecDeque;

use canvas_model::{ContentHash, ErrorCode, RunRequest, Seed};
use parking_lot::Mutex;
use serde::Serialize;

use crate::driver::RunOutcome;
use crate::state_machine::RunStatus;
use crate::view::RunId;

/// Default number of retained entries
pub const DEFAULT_HISTORY_LEN: usize = 20;

/// One finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Run id
    pub run_id: RunId,
    /// Template analysed
    pub template_id: String,
    /// Seed sent with the request
    pub seed: Option<Seed>,
    /// Terminal status
    pub status: RunStatus,
    /// Report hash on success
    pub hash: Option<ContentHash>,
    /// Error code on failure
    pub error_code: Option<ErrorCode>,
    /// Finish time, epoch milliseconds
    pub finished_at_ms: i64,
}

impl HistoryEntry {
    /// Entry for `request` ending with `outcome`
    #[must_use]
    pub fn new(
        run_id: RunId,
        request: &RunRequest,
        outcome: &RunOutcome,
        finished_at_ms: i64,
    ) -> Self {
        let (status, hash, error_code) = match outcome {
            RunOutcome::Completed(c) => (RunStatus::Complete, Some(c.report.hash()), None),
            RunOutcome::Failed(err) => (RunStatus::Error, None, Some(err.code)),
            RunOutcome::Cancelled => (RunStatus::Cancelled, None, None),
        };
        Self {
            run_id,
            template_id: request.template_id.clone(),
            seed: request.seed,
            status,
            hash,
            error_code,
            finished_at_ms,
        }
    }
}

/// Ring of the most recent entries, newest last
#[derive(Debug)]
pub struct RunHistory {
    entries: Mutex<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl RunHistory {
    /// History keeping at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&self, entry: HistoryEntry) {
        let mut entries = self.entries.lock();
        if self.capacity == 0 {
            return;
        }
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no run has finished
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn keeps_most_recent() {
        let history = RunHistory::new(3);
        let request = RunRequest::new("pricing-v1");
        let ids: Vec<RunId> = (0..5).map(|_| Ulid::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            history.push(HistoryEntry::new(*id, &request, &RunOutcome::Cancelled, i as i64));
        }
        let kept: Vec<RunId> = history.entries().iter().map(|e| e.run_id).collect();
        assert_eq!(kept, ids[2..].to_vec());
    }
}
