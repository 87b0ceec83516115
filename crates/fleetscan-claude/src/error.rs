//! Error types for the Claude Code executor.

use thiserror::Error;

/// Errors that can occur while running the Claude CLI.
#[derive(Debug, Error)]
pub enum ClaudeError {
    /// Claude CLI executable not found.
    #[error("Claude CLI not found at '{0}'. Ensure Claude Code is installed.")]
    ClaudeNotFound(String),

    /// Failed to spawn or talk to the Claude process.
    #[error("Failed to run Claude process: {0}")]
    SpawnError(#[from] std::io::Error),

    /// Claude process exited with an error or reported one in its result.
    #[error("Claude process exited with error: {0}")]
    ProcessError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The receiver of the text chunks went away.
    #[error("Channel closed")]
    ChannelClosed,
}

impl ClaudeError {
    /// True when the CLI could not be started at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ClaudeNotFound(_) | Self::SpawnError(_))
    }
}
