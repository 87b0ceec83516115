//! Runner and worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use fleetscan_core::CoreError;

/// Batch execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Maximum services with a worker call in flight.
    pub concurrency: usize,

    /// Per-service limit on the worker call. `None` waits indefinitely.
    pub service_timeout: Option<Duration>,

    /// Capacity of each service's chunk channel.
    pub chunk_buffer: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            service_timeout: None,
            chunk_buffer: 64,
        }
    }
}

impl RunnerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_service_timeout(mut self, timeout: Duration) -> Self {
        self.service_timeout = Some(timeout);
        self
    }

    pub fn with_chunk_buffer(mut self, capacity: usize) -> Self {
        self.chunk_buffer = capacity.max(1);
        self
    }

    /// Reject settings that could never admit a service.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.concurrency == 0 {
            return Err(CoreError::InvalidConcurrency(self.concurrency));
        }
        Ok(())
    }
}

/// Settings for the Claude-backed worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeWorkerConfig {
    /// Path to the claude CLI binary.
    pub claude_path: String,

    /// Model override.
    pub model: Option<String>,

    /// Directory holding one checkout per service.
    pub repos_root: PathBuf,

    /// Organization that owns the service repositories.
    pub organization: String,
}

impl Default for ClaudeWorkerConfig {
    fn default() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None,
            repos_root: PathBuf::from("./repos"),
            organization: "azure".to_string(),
        }
    }
}
