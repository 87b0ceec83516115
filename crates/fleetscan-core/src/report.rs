//! Batch report handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateSummary;
use crate::summary::{ParsedSummary, UnparsedResult};
use crate::{BatchId, FailureReason, Grade, OperationKind, TrackerState};

/// What a service ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ServiceOutcome {
    /// Structured summary, possibly flagged inconsistent.
    Summary(ParsedSummary),
    /// The stream ended without a usable summary; raw text retained.
    Unparsed(UnparsedResult),
    /// The service failed before its stream ended.
    Error(FailureReason),
}

/// One service's entry in a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResult {
    pub service: String,
    pub kind: OperationKind,
    /// Terminal state: `Done` or `Failed`.
    pub state: TrackerState,
    pub outcome: ServiceOutcome,
    /// Set by the aggregator for kinds that report affected/total figures.
    pub grade: Option<Grade>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ServiceResult {
    pub fn summary(&self) -> Option<&ParsedSummary> {
        match &self.outcome {
            ServiceOutcome::Summary(summary) => Some(summary),
            _ => None,
        }
    }

    /// Why the service failed, if it did.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match &self.outcome {
            ServiceOutcome::Summary(_) => None,
            ServiceOutcome::Unparsed(_) => Some(FailureReason::Unparsed),
            ServiceOutcome::Error(reason) => Some(reason.clone()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == TrackerState::Done
    }

    /// Wall time between dispatch and the terminal state, in milliseconds.
    pub fn duration_ms(&self) -> Option<i64> {
        Some((self.finished_at? - self.started_at?).num_milliseconds())
    }
}

/// Result of one batch: every requested service exactly once, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub kind: OperationKind,
    pub entries: Vec<ServiceResult>,
    /// Filled in by [`ResultAggregator`](crate::ResultAggregator).
    pub aggregate: Option<AggregateSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// Create a report without aggregate data.
    pub fn new(
        batch_id: BatchId,
        kind: OperationKind,
        entries: Vec<ServiceResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id,
            kind,
            entries,
            aggregate: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Look up a service's entry.
    pub fn entry(&self, service: &str) -> Option<&ServiceResult> {
        self.entries.iter().find(|e| e.service == service)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Service names in report order.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.service.as_str())
    }

    /// True when every service finished with a summary.
    pub fn all_done(&self) -> bool {
        self.entries.iter().all(ServiceResult::is_done)
    }
}
