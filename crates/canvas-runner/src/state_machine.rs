//! Run lifecycle state machine
//!
//! ```text
//!  idle ─▶ preparing ─▶ connecting ─▶ running ─▶ complete
//!             │  │           │           │ ├───▶ error
//!             │  │           │           │ └───▶ cancelled
//!             │  └───────────┴───────────┴─▶ (same terminals)
//!             └─▶ complete (non-streaming or cached)
//! ```
//!
//! Terminal states return to `preparing` on the next run or to `idle` on
//! clear.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Lifecycle status of a run slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Nothing has run
    #[default]
    Idle,
    /// Request being built and dispatched
    Preparing,
    /// Backend accepted the run
    Connecting,
    /// Progress ticks arriving
    Running,
    /// Report available
    Complete,
    /// Run failed
    Error,
    /// Run cancelled by the user
    Cancelled,
}

impl RunStatus {
    /// Whether a run is in flight
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Preparing | Self::Connecting | Self::Running)
    }

    /// Whether the run has ended
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses reachable from `from`
#[must_use]
pub fn allowed_transitions(from: RunStatus) -> &'static [RunStatus] {
    use RunStatus::{Cancelled, Complete, Connecting, Error, Idle, Preparing, Running};
    match from {
        Idle => &[Preparing],
        Preparing => &[Connecting, Complete, Error, Cancelled],
        Connecting => &[Running, Complete, Error, Cancelled],
        Running => &[Complete, Error, Cancelled],
        Complete | Error | Cancelled => &[Preparing, Idle],
    }
}

/// Check a transition against the table
///
/// # Errors
/// Returns `RunnerError::IllegalTransition` for transitions not in the table
pub fn validate_transition(from: RunStatus, to: RunStatus) -> Result<(), RunnerError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(RunnerError::IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunStatus::*;

    const ALL: [RunStatus; 7] = [Idle, Preparing, Connecting, Running, Complete, Error, Cancelled];

    #[test]
    fn happy_path_is_legal() {
        for (from, to) in [
            (Idle, Preparing),
            (Preparing, Connecting),
            (Connecting, Running),
            (Running, Complete),
            (Complete, Preparing),
        ] {
            assert!(validate_transition(from, to).is_ok(), "{from} -> {to}");
        }
    }

    #[test]
    fn skipping_ahead_is_illegal() {
        assert!(validate_transition(Idle, Running).is_err());
        assert!(validate_transition(Idle, Complete).is_err());
        assert!(validate_transition(Complete, Running).is_err());
        assert!(validate_transition(Cancelled, Cancelled).is_err());
    }

    #[test]
    fn every_active_state_can_fail_or_cancel() {
        for from in ALL.into_iter().filter(|s| s.is_active()) {
            assert!(validate_transition(from, Error).is_ok());
            assert!(validate_transition(from, Cancelled).is_ok());
        }
    }

    #[test]
    fn terminal_states_only_restart_or_clear() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            assert_eq!(allowed_transitions(from), &[Preparing, Idle]);
        }
    }
}
