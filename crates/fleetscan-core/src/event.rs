//! Progress events emitted as trackers change state.

use serde::{Deserialize, Serialize};

use crate::summary::ParsedSummary;
use crate::tracker::TrackerSnapshot;
use crate::{BatchId, FailureReason, TrackerState};

/// A tracker transition, for live display. Informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Batch this event belongs to.
    pub batch_id: BatchId,
    /// Service whose tracker moved.
    pub service: String,
    /// State after the transition.
    pub state: TrackerState,
    /// Partial (or, once `Done`, final) summary.
    pub partial: Option<ParsedSummary>,
    /// Set when `state` is `Failed`.
    pub failure: Option<FailureReason>,
    /// Chunks received so far.
    pub chunks: usize,
    /// Unix timestamp (milliseconds) when the event was created.
    pub timestamp_ms: i64,
}

impl ProgressEvent {
    /// Create an event from a tracker snapshot.
    pub fn from_snapshot(batch_id: BatchId, snapshot: &TrackerSnapshot) -> Self {
        Self {
            batch_id,
            service: snapshot.service.clone(),
            state: snapshot.state,
            partial: snapshot.partial.clone(),
            failure: snapshot.failure.clone(),
            chunks: snapshot.chunks,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
