//! Core domain errors.

use thiserror::Error;

/// Core domain errors for fleetscan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A batch was requested without any services.
    #[error("Invalid request: no services given")]
    EmptyBatch,

    /// A service name was empty or whitespace.
    #[error("Invalid request: empty service name")]
    EmptyServiceName,

    /// The same service was requested twice in one batch.
    #[error("Invalid request: duplicate service '{0}'")]
    DuplicateService(String),

    /// Concurrency limit must admit at least one service.
    #[error("Invalid request: concurrency must be at least 1 (got {0})")]
    InvalidConcurrency(usize),

    /// Invalid state transition.
    #[error("Invalid state transition for '{service}': {from} -> {to}")]
    InvalidStateTransition {
        service: String,
        from: String,
        to: String,
    },
}

impl CoreError {
    /// Returns true for errors that reject a batch before any task starts.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::EmptyBatch
                | Self::EmptyServiceName
                | Self::DuplicateService(_)
                | Self::InvalidConcurrency(_)
        )
    }
}
