//! The worker seam and its Claude Code implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use fleetscan_claude::{ClaudeError, ClaudeExecutor, PermissionMode};
use fleetscan_core::{FailureReason, OperationKind};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ClaudeWorkerConfig;
use crate::prompts::build_prompt;

/// Errors a worker call can end with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker could not be reached for this service.
    #[error("worker unavailable: {0}")]
    Unavailable(String),

    /// The worker failed after it started streaming.
    #[error("worker stream failed: {0}")]
    Stream(String),
}

impl WorkerError {
    /// The tracker failure this error maps to.
    pub fn into_failure(self) -> FailureReason {
        match self {
            Self::Unavailable(detail) => FailureReason::WorkerUnavailable(detail),
            Self::Stream(detail) => FailureReason::WorkerError(detail),
        }
    }
}

impl From<ClaudeError> for WorkerError {
    fn from(err: ClaudeError) -> Self {
        if err.is_unavailable() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Stream(err.to_string())
        }
    }
}

/// Performs one service's analysis and streams its text.
///
/// Implementations send text fragments in order and return once the stream is finished. The
/// runner may drop the returned future (timeout, cancellation); implementations must not leave
/// work running when that happens.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(
        &self,
        service: &str,
        kind: OperationKind,
        output_tx: mpsc::Sender<String>,
    ) -> Result<(), WorkerError>;
}

/// Worker backed by the Claude Code CLI, run inside each service's checkout.
#[derive(Debug, Clone)]
pub struct ClaudeWorker {
    executor: ClaudeExecutor,
    config: ClaudeWorkerConfig,
}

impl ClaudeWorker {
    pub fn new(config: ClaudeWorkerConfig) -> Self {
        let mut executor = ClaudeExecutor::new(&config.claude_path)
            .with_permission_mode(PermissionMode::AcceptEdits);
        for tool in ["Bash", "Read", "Grep", "Glob"] {
            executor = executor.with_allowed_tool(tool);
        }
        if let Some(model) = &config.model {
            executor = executor.with_model(model);
        }
        Self { executor, config }
    }

    /// Directory the CLI runs in. Forks run in the repos root since the checkout does not exist yet.
    pub fn working_dir(&self, service: &str, kind: OperationKind) -> PathBuf {
        match kind {
            OperationKind::Fork => self.config.repos_root.clone(),
            _ => self.config.repos_root.join(service),
        }
    }
}

#[async_trait]
impl Worker for ClaudeWorker {
    async fn run(
        &self,
        service: &str,
        kind: OperationKind,
        output_tx: mpsc::Sender<String>,
    ) -> Result<(), WorkerError> {
        let working_dir = self.working_dir(service, kind);
        if !working_dir.is_dir() {
            return Err(WorkerError::Unavailable(format!(
                "directory '{}' does not exist",
                working_dir.display()
            )));
        }

        let prompt = build_prompt(kind, service, &self.config.organization, &working_dir);
        debug!(service = %service, prompt_len = prompt.len(), "Built prompt for service");

        let result = self.executor.stream(&working_dir, &prompt, output_tx).await?;
        info!(
            service = %service,
            session_id = ?result.session_id,
            duration_ms = ?result.duration_ms,
            chunks = result.chunks,
            "Claude run finished"
        );
        Ok(())
    }
}
