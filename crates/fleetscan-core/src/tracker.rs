//! Per-service state machine.
//!
//! A [`ServiceTracker`] owns everything known about one service while a batch runs: its state,
//! the text streamed by the worker so far, the latest partial summary and, once terminal, the
//! final outcome. Every transition is synchronous.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grammar;
use crate::report::{ServiceOutcome, ServiceResult};
use crate::summary::{ParseOutcome, ParsedSummary};
use crate::{CoreError, FailureReason, OperationKind, ServiceTask, TrackerState};

/// Read-only view of a tracker for display and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub service: String,
    pub kind: OperationKind,
    pub state: TrackerState,
    /// Latest summary extracted from complete lines. Not authoritative until `Done`.
    pub partial: Option<ParsedSummary>,
    pub failure: Option<FailureReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Chunks received.
    pub chunks: usize,
    /// Bytes received.
    pub bytes: usize,
}

/// Tracks one service from dispatch to a terminal state.
#[derive(Debug, Clone)]
pub struct ServiceTracker {
    task: ServiceTask,
    state: TrackerState,
    buffer: String,
    /// Byte length of the buffer prefix made of complete lines.
    complete_len: usize,
    partial: Option<ParsedSummary>,
    outcome: Option<ParseOutcome>,
    failure: Option<FailureReason>,
    chunks: usize,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl ServiceTracker {
    /// Create a pending tracker for a task.
    pub fn new(task: ServiceTask) -> Self {
        Self {
            task,
            state: TrackerState::Pending,
            buffer: String::new(),
            complete_len: 0,
            partial: None,
            outcome: None,
            failure: None,
            chunks: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn service(&self) -> &str {
        &self.task.service
    }

    pub fn kind(&self) -> OperationKind {
        self.task.kind
    }

    pub fn task(&self) -> &ServiceTask {
        &self.task
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Text received so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn partial(&self) -> Option<&ParsedSummary> {
        self.partial.as_ref()
    }

    /// Final parse outcome, set by [`on_stream_end`](Self::on_stream_end).
    pub fn outcome(&self) -> Option<&ParseOutcome> {
        self.outcome.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    fn refuse(&self, to: TrackerState) -> CoreError {
        warn!(
            service = %self.task.service,
            from = %self.state,
            to = %to,
            "Refused tracker transition"
        );
        CoreError::InvalidStateTransition {
            service: self.task.service.clone(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    fn transition(&mut self, to: TrackerState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(to) {
            return Err(self.refuse(to));
        }
        self.state = to;
        Ok(())
    }

    /// Pending → Running. Records the start time.
    pub fn dispatch(&mut self) -> Result<(), CoreError> {
        self.transition(TrackerState::Running)?;
        self.started_at = Some(Utc::now());
        debug!(service = %self.task.service, kind = %self.task.kind, "Tracker dispatched");
        Ok(())
    }

    /// Append a chunk and refresh the partial summary.
    ///
    /// Only chunks that complete at least one line trigger a parse, and the parse only covers
    /// complete lines so a half-received marker is never misread.
    pub fn on_chunk(&mut self, chunk: &str) -> Result<(), CoreError> {
        if self.state != TrackerState::Running {
            return Err(self.refuse(TrackerState::Parsing));
        }

        self.buffer.push_str(chunk);
        self.chunks += 1;

        if !chunk.contains('\n') {
            return Ok(());
        }

        self.transition(TrackerState::Parsing)?;
        self.complete_len = self.buffer.rfind('\n').map_or(0, |i| i + 1);
        if let ParseOutcome::Parsed(summary) =
            grammar::parse(&self.buffer[..self.complete_len], self.task.kind)
        {
            self.partial = Some(summary);
        }
        self.transition(TrackerState::Running)
    }

    /// Fix the terminal summary: `Done` when the text parses, `Failed(Unparsed)` otherwise.
    pub fn on_stream_end(&mut self) -> Result<TrackerState, CoreError> {
        self.transition(TrackerState::Parsing)?;
        let outcome = grammar::parse(&self.buffer, self.task.kind);

        let next = match &outcome {
            ParseOutcome::Parsed(summary) => {
                self.partial = Some(summary.clone());
                TrackerState::Done
            }
            ParseOutcome::Unparsed(unparsed) => {
                debug!(
                    service = %self.task.service,
                    reason = %unparsed.reason,
                    bytes = self.buffer.len(),
                    "No summary in worker output"
                );
                self.failure = Some(FailureReason::Unparsed);
                TrackerState::Failed
            }
        };

        self.outcome = Some(outcome);
        self.complete_len = self.buffer.len();
        self.transition(next)?;
        self.finished_at = Some(Utc::now());
        Ok(next)
    }

    /// Record a worker error. Same as [`fail`](Self::fail).
    pub fn on_worker_error(&mut self, reason: FailureReason) -> bool {
        self.fail(reason)
    }

    /// Move any non-terminal tracker to `Failed`.
    ///
    /// Returns `false` and changes nothing when the tracker is already terminal.
    pub fn fail(&mut self, reason: FailureReason) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        debug!(service = %self.task.service, from = %self.state, reason = %reason, "Tracker failed");
        self.state = TrackerState::Failed;
        self.failure = Some(reason);
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            service: self.task.service.clone(),
            kind: self.task.kind,
            state: self.state,
            partial: self.partial.clone(),
            failure: self.failure.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            chunks: self.chunks,
            bytes: self.buffer.len(),
        }
    }

    /// Consume a tracker into its report entry.
    ///
    /// A tracker that never reached a terminal state is reported as cancelled.
    pub fn into_result(mut self) -> ServiceResult {
        if !self.state.is_terminal() {
            self.fail(FailureReason::Cancelled);
        }

        let outcome = match (self.outcome, self.failure) {
            (Some(ParseOutcome::Parsed(summary)), _) => ServiceOutcome::Summary(summary),
            (Some(ParseOutcome::Unparsed(unparsed)), _) => ServiceOutcome::Unparsed(unparsed),
            (None, Some(reason)) => ServiceOutcome::Error(reason),
            (None, None) => ServiceOutcome::Error(FailureReason::Cancelled),
        };

        ServiceResult {
            service: self.task.service,
            kind: self.task.kind,
            state: self.state,
            outcome,
            grade: None,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(kind: OperationKind) -> ServiceTracker {
        ServiceTracker::new(ServiceTask::new("partition", kind))
    }

    #[test]
    fn test_stream_to_done() {
        let mut t = tracker(OperationKind::Vulns);
        assert_eq!(t.state(), TrackerState::Pending);
        t.dispatch().unwrap();
        assert!(t.snapshot().started_at.is_some());

        t.on_chunk("Checking dependencies...\n✓ partition: Analysis ").unwrap();
        assert!(t.partial().is_none());
        t.on_chunk("complete - 3 critical, 5 high, 12 medium vulnerabilities\n")
            .unwrap();
        assert_eq!(t.state(), TrackerState::Running);
        assert_eq!(t.partial().and_then(|s| s.count("high")), Some(5));

        assert_eq!(t.on_stream_end().unwrap(), TrackerState::Done);
        assert!(t.failure().is_none());
        let snapshot = t.snapshot();
        assert_eq!(snapshot.chunks, 2);
        assert!(snapshot.finished_at.is_some());
    }

    #[test]
    fn test_partial_ignores_incomplete_line() {
        let mut t = tracker(OperationKind::Vulns);
        t.dispatch().unwrap();
        t.on_chunk("✓ partition: Analysis complete - 3 critical\n").unwrap();
        t.on_chunk("✓ partition: Analysis complete - 4 crit").unwrap();
        assert_eq!(t.partial().and_then(|s| s.count("critical")), Some(3));
        t.on_chunk("ical\n").unwrap();
        assert_eq!(t.partial().and_then(|s| s.count("critical")), Some(4));
    }

    #[test]
    fn test_incremental_matches_final() {
        let text = "✓ legal: Analysis complete - 1 major, 2 minor, 3 patch updates\nTotal: 20 dependencies\nOutdated: 6 dependencies\n";
        let mut t = tracker(OperationKind::Depends);
        t.dispatch().unwrap();
        for piece in text.as_bytes().chunks(7) {
            t.on_chunk(std::str::from_utf8(piece).unwrap()).unwrap();
        }
        t.on_stream_end().unwrap();
        assert_eq!(
            t.outcome(),
            Some(&grammar::parse(text, OperationKind::Depends))
        );
    }

    #[test]
    fn test_unparsed_stream_fails() {
        let mut t = tracker(OperationKind::Test);
        t.dispatch().unwrap();
        t.on_chunk("I could not find a test suite.").unwrap();
        assert_eq!(t.on_stream_end().unwrap(), TrackerState::Failed);
        assert_eq!(t.failure(), Some(&FailureReason::Unparsed));

        let result = t.into_result();
        match result.outcome {
            ServiceOutcome::Unparsed(u) => assert!(u.raw.contains("test suite")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_refuses_chunk_after_done() {
        let mut t = tracker(OperationKind::Fork);
        t.dispatch().unwrap();
        t.on_chunk("✓ partition: Analysis complete\n").unwrap();
        t.on_stream_end().unwrap();

        let err = t.on_chunk("late").unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert_eq!(t.state(), TrackerState::Done);
        assert!(!t.fail(FailureReason::Timeout));
        assert_eq!(t.state(), TrackerState::Done);
    }

    #[test]
    fn test_chunk_before_dispatch_refused() {
        let mut t = tracker(OperationKind::Status);
        assert!(t.on_chunk("early\n").is_err());
        assert!(t.on_stream_end().is_err());
        assert_eq!(t.state(), TrackerState::Pending);
    }

    #[test]
    fn test_worker_error_from_running() {
        let mut t = tracker(OperationKind::Vulns);
        t.dispatch().unwrap();
        t.on_chunk("partial output\n").unwrap();
        assert!(t.on_worker_error(FailureReason::WorkerError("broken pipe".into())));
        assert_eq!(t.state(), TrackerState::Failed);

        let result = t.into_result();
        assert_eq!(
            result.outcome,
            ServiceOutcome::Error(FailureReason::WorkerError("broken pipe".into()))
        );
    }

    #[test]
    fn test_pending_tracker_reports_cancelled() {
        let result = tracker(OperationKind::Depends).into_result();
        assert_eq!(result.state, TrackerState::Failed);
        assert_eq!(result.outcome, ServiceOutcome::Error(FailureReason::Cancelled));
    }
}
