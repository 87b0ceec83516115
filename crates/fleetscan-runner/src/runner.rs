//! Batch orchestration.
//!
//! The runner validates a request, creates one tracker per service and admits services through
//! the [`ConcurrencyGate`] in submission order. Every admitted service runs on its own task:
//! the worker call and the chunk feed run side by side over a bounded channel, so the tracker
//! sees chunks strictly in the order the worker sent them. Whatever happens to a service ends
//! in a terminal tracker state; only an invalid request fails the batch as a whole.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fleetscan_core::{
    BatchReport, BatchRequest, CoreError, FailureReason, OperationKind, ProgressEvent,
    ResultAggregator, ServiceTracker,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::context::BatchContext;
use crate::gate::{ConcurrencyGate, Slot};
use crate::worker::{Worker, WorkerError};

/// Runs batches of per-service worker calls.
pub struct WorkflowRunner {
    worker: Arc<dyn Worker>,
    config: RunnerConfig,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    aggregator: ResultAggregator,
}

/// Writes snapshots to the batch context and forwards progress events.
#[derive(Clone)]
struct Publisher {
    ctx: Arc<BatchContext>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Publisher {
    fn publish(&self, tracker: &ServiceTracker) {
        let snapshot = tracker.snapshot();
        if let Some(tx) = &self.progress {
            // Display is optional; a gone receiver is not an error.
            let _ = tx.send(ProgressEvent::from_snapshot(self.ctx.id().clone(), &snapshot));
        }
        self.ctx.record(snapshot);
    }
}

/// How a service's worker call ended.
enum CallOutcome {
    Finished(Result<(), WorkerError>),
    TimedOut,
    Cancelled,
}

enum ServiceHandle {
    Spawned(JoinHandle<ServiceTracker>),
    Settled(ServiceTracker),
}

impl WorkflowRunner {
    pub fn new(worker: Arc<dyn Worker>, config: RunnerConfig) -> Self {
        Self {
            worker,
            config,
            progress: None,
            aggregator: ResultAggregator::new(),
        }
    }

    /// Send a [`ProgressEvent`] for every tracker transition.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a batch to completion.
    pub async fn run<I, S>(&self, services: I, kind: OperationKind) -> Result<BatchReport, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_with_cancel(services, kind, CancellationToken::new())
            .await
    }

    /// Run a batch that stops early when `cancel` fires.
    pub async fn run_with_cancel<I, S>(
        &self,
        services: I,
        kind: OperationKind,
        cancel: CancellationToken,
    ) -> Result<BatchReport, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.validate()?;
        let request = BatchRequest::new(services, kind)?;
        let ctx = Arc::new(BatchContext::new(request));
        self.execute(ctx, cancel).await
    }

    /// Run a batch whose context the caller keeps for live queries.
    pub async fn execute(
        &self,
        ctx: Arc<BatchContext>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, CoreError> {
        let gate = ConcurrencyGate::new(self.config.concurrency)?;
        let publisher = Publisher {
            ctx: ctx.clone(),
            progress: self.progress.clone(),
        };

        info!(
            batch = %ctx.id().short(),
            kind = %ctx.kind(),
            services = ctx.tasks().len(),
            concurrency = gate.capacity(),
            "Starting batch"
        );

        let trackers: Vec<ServiceTracker> = ctx
            .tasks()
            .iter()
            .cloned()
            .map(ServiceTracker::new)
            .collect();
        for tracker in &trackers {
            publisher.publish(tracker);
        }

        let mut handles = Vec::with_capacity(trackers.len());
        for mut tracker in trackers {
            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                slot = gate.admit() => slot,
            };

            let Some(slot) = slot else {
                tracker.fail(FailureReason::Cancelled);
                publisher.publish(&tracker);
                handles.push(ServiceHandle::Settled(tracker));
                continue;
            };

            debug!(service = %tracker.service(), in_flight = gate.in_flight(), "Admitted service");
            let service = ServiceRun {
                worker: self.worker.clone(),
                publisher: publisher.clone(),
                cancel: cancel.clone(),
                timeout: self.config.service_timeout,
                chunk_buffer: self.config.chunk_buffer,
            };
            handles.push(ServiceHandle::Spawned(tokio::spawn(
                service.run(tracker, slot),
            )));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (handle, task) in handles.into_iter().zip(ctx.tasks()) {
            let tracker = match handle {
                ServiceHandle::Settled(tracker) => tracker,
                ServiceHandle::Spawned(join) => match join.await {
                    Ok(tracker) => tracker,
                    Err(e) => {
                        error!(service = %task.service, error = %e, "Service task did not complete");
                        let mut tracker = ServiceTracker::new(task.clone());
                        let detail = if e.is_panic() {
                            "service task panicked"
                        } else {
                            "service task aborted"
                        };
                        tracker.fail(FailureReason::WorkerError(detail.to_string()));
                        publisher.publish(&tracker);
                        tracker
                    }
                },
            };
            results.push(tracker.into_result());
        }

        let report = BatchReport::new(ctx.id().clone(), ctx.kind(), results, ctx.started_at());
        let report = self.aggregator.aggregate(report);

        let done = report.entries.iter().filter(|e| e.is_done()).count();
        info!(
            batch = %ctx.id().short(),
            done = done,
            failed = report.len() - done,
            cancelled = cancel.is_cancelled(),
            "Batch finished"
        );

        Ok(report)
    }
}

/// Everything one service task needs besides its tracker and slot.
struct ServiceRun {
    worker: Arc<dyn Worker>,
    publisher: Publisher,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    chunk_buffer: usize,
}

impl ServiceRun {
    async fn run(self, mut tracker: ServiceTracker, slot: Slot) -> ServiceTracker {
        if let Err(e) = tracker.dispatch() {
            warn!(error = %e, "Could not dispatch tracker");
            drop(slot);
            return tracker;
        }
        self.publisher.publish(&tracker);

        let outcome = {
            let call = stream_into(
                self.worker.as_ref(),
                &mut tracker,
                &self.publisher,
                self.chunk_buffer,
            );
            tokio::select! {
                _ = self.cancel.cancelled() => CallOutcome::Cancelled,
                finished = with_timeout(self.timeout, call) => match finished {
                    Some(result) => CallOutcome::Finished(result),
                    None => CallOutcome::TimedOut,
                },
            }
        };

        let service = tracker.service().to_string();
        match outcome {
            CallOutcome::Finished(Ok(())) => match tracker.on_stream_end() {
                Ok(state) => debug!(service = %service, state = %state, "Stream ended"),
                Err(e) => {
                    warn!(service = %service, error = %e, "Stream end refused");
                    tracker.fail(FailureReason::WorkerError(e.to_string()));
                }
            },
            CallOutcome::Finished(Err(e)) => {
                warn!(service = %service, error = %e, "Worker call failed");
                tracker.on_worker_error(e.into_failure());
            }
            CallOutcome::TimedOut => {
                warn!(service = %service, timeout = ?self.timeout, "Worker call timed out");
                tracker.fail(FailureReason::Timeout);
            }
            CallOutcome::Cancelled => {
                info!(service = %service, "Worker call cancelled");
                tracker.fail(FailureReason::Cancelled);
            }
        }

        self.publisher.publish(&tracker);
        // Terminal before the next service may be admitted.
        debug_assert!(tracker.state().is_terminal());
        drop(slot);
        tracker
    }
}

/// Run the worker call and feed its chunks to the tracker until both are finished.
async fn stream_into(
    worker: &dyn Worker,
    tracker: &mut ServiceTracker,
    publisher: &Publisher,
    chunk_buffer: usize,
) -> Result<(), WorkerError> {
    let service = tracker.service().to_string();
    let kind = tracker.kind();
    let (tx, mut rx) = mpsc::channel::<String>(chunk_buffer.max(1));

    let call = worker.run(&service, kind, tx);
    let feed = async {
        while let Some(chunk) = rx.recv().await {
            if let Err(e) = tracker.on_chunk(&chunk) {
                warn!(service = %service, error = %e, "Dropped chunk");
                continue;
            }
            if chunk.contains('\n') {
                publisher.publish(tracker);
            }
        }
    };

    let (result, ()) = tokio::join!(call, feed);
    result
}

async fn with_timeout<F: Future>(limit: Option<Duration>, future: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}
