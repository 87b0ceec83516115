//! Deterministic worker for runner tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fleetscan_core::OperationKind;
use tokio::sync::mpsc;

use crate::worker::{Worker, WorkerError};

/// One step of a scripted worker call.
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(String),
    Delay(Duration),
    Unavailable(String),
    StreamError(String),
    /// Never finish.
    Stall,
    Panic,
}

impl Step {
    pub fn chunk(text: &str) -> Self {
        Self::Chunk(text.to_string())
    }

    pub fn delay_ms(ms: u64) -> Self {
        Self::Delay(Duration::from_millis(ms))
    }
}

/// Replays a script per service and records how it was called.
#[derive(Debug, Default)]
pub struct ScriptedWorker {
    scripts: HashMap<String, Vec<Step>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, service: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(service.to_string(), steps);
        self
    }

    /// Calls currently running (futures not yet finished or dropped).
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent calls.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Services in the order their calls started.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn run(
        &self,
        service: &str,
        _kind: OperationKind,
        output_tx: mpsc::Sender<String>,
    ) -> Result<(), WorkerError> {
        self.started.lock().unwrap().push(service.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let Some(steps) = self.scripts.get(service) else {
            return Err(WorkerError::Unavailable(format!("no script for {}", service)));
        };

        for step in steps {
            match step {
                Step::Chunk(text) => output_tx
                    .send(text.clone())
                    .await
                    .map_err(|_| WorkerError::Stream("receiver dropped".to_string()))?,
                Step::Delay(duration) => tokio::time::sleep(*duration).await,
                Step::Unavailable(detail) => return Err(WorkerError::Unavailable(detail.clone())),
                Step::StreamError(detail) => return Err(WorkerError::Stream(detail.clone())),
                Step::Stall => std::future::pending::<()>().await,
                Step::Panic => panic!("scripted worker panic for {}", service),
            }
        }
        Ok(())
    }
}
