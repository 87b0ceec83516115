//! Tracker states and failure reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a single service's tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerState {
    /// Waiting for a concurrency slot.
    #[default]
    Pending,
    /// Worker call in flight.
    Running,
    /// Incremental parse of the buffer in progress.
    Parsing,
    /// Stream ended with a structured summary.
    Done,
    /// Terminal failure, see `FailureReason`.
    Failed,
}

impl TrackerState {
    /// Returns true if the tracker is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true while a worker call holds a slot for this tracker.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Parsing)
    }

    /// Whether `next` is a legal transition from this state.
    ///
    /// Running and Parsing alternate while chunks arrive; every other move goes forward.
    pub fn can_transition_to(&self, next: TrackerState) -> bool {
        use TrackerState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Parsing)
                | (Parsing, Running)
                | (Running | Parsing, Done | Failed)
        )
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Parsing => "PARSING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why a tracker ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum FailureReason {
    /// The worker could not be reached for this service.
    WorkerUnavailable(String),
    /// The worker failed mid-stream.
    WorkerError(String),
    /// The stream ended without any recognized structured output.
    Unparsed,
    /// The per-service timeout elapsed.
    Timeout,
    /// The batch was cancelled before this service finished.
    Cancelled,
}

impl FailureReason {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WorkerUnavailable(_) => "worker-unavailable",
            Self::WorkerError(_) => "worker-error",
            Self::Unparsed => "unparsed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkerUnavailable(detail) | Self::WorkerError(detail) => {
                write!(f, "{}: {}", self.code(), detail)
            }
            _ => f.write_str(self.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_only_move_forward() {
        use TrackerState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Parsing));
        assert!(Parsing.can_transition_to(Running));
        assert!(Parsing.can_transition_to(Done));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Done));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn test_failure_reason_codes() {
        assert_eq!(FailureReason::Cancelled.to_string(), "cancelled");
        assert_eq!(
            FailureReason::WorkerUnavailable("connection refused".into()).to_string(),
            "worker-unavailable: connection refused"
        );
        assert_eq!(FailureReason::Unparsed.code(), "unparsed");
    }
}
