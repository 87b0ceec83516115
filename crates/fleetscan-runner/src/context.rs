//! Batch-scoped state shared between the runner and its readers.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use fleetscan_core::{BatchId, BatchRequest, OperationKind, ServiceTask, TrackerSnapshot};

/// Everything one batch owns. Dropped with the report.
///
/// Each service's snapshot is written only by that service's task; any number of readers may
/// query while the batch runs.
#[derive(Debug)]
pub struct BatchContext {
    id: BatchId,
    kind: OperationKind,
    tasks: Vec<ServiceTask>,
    snapshots: RwLock<HashMap<String, TrackerSnapshot>>,
    started_at: DateTime<Utc>,
}

impl BatchContext {
    /// Create a context for a validated request.
    pub fn new(request: BatchRequest) -> Self {
        Self {
            id: BatchId::generate(),
            kind: request.kind(),
            tasks: request.tasks().to_vec(),
            snapshots: RwLock::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &BatchId {
        &self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Tasks in submission order.
    pub fn tasks(&self) -> &[ServiceTask] {
        &self.tasks
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Store the latest snapshot of a service.
    pub fn record(&self, snapshot: TrackerSnapshot) {
        let mut snapshots = self
            .snapshots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshots.insert(snapshot.service.clone(), snapshot);
    }

    /// Latest snapshot of one service.
    pub fn snapshot(&self, service: &str) -> Option<TrackerSnapshot> {
        self.snapshots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(service)
            .cloned()
    }

    /// Latest snapshots in submission order.
    pub fn snapshots(&self) -> Vec<TrackerSnapshot> {
        let snapshots = self
            .snapshots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.tasks
            .iter()
            .filter_map(|task| snapshots.get(&task.service).cloned())
            .collect()
    }

    /// Services whose worker call is in flight.
    pub fn active_count(&self) -> usize {
        self.snapshots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|s| s.state.is_active())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscan_core::{ServiceTracker, TrackerState};

    #[test]
    fn test_snapshots_follow_submission_order() {
        let request =
            BatchRequest::new(["storage", "legal", "file"], OperationKind::Status).unwrap();
        let ctx = BatchContext::new(request);

        for task in ctx.tasks().iter().rev() {
            ctx.record(ServiceTracker::new(task.clone()).snapshot());
        }
        let services: Vec<_> = ctx.snapshots().into_iter().map(|s| s.service).collect();
        assert_eq!(services, vec!["storage", "legal", "file"]);
        assert_eq!(ctx.active_count(), 0);

        let mut tracker = ServiceTracker::new(ctx.tasks()[1].clone());
        tracker.dispatch().unwrap();
        ctx.record(tracker.snapshot());
        assert_eq!(ctx.snapshot("legal").unwrap().state, TrackerState::Running);
        assert_eq!(ctx.active_count(), 1);
    }
}
