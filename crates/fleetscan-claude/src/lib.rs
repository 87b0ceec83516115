//! Claude Code executor for fleetscan
//!
//! Spawns the Claude Code CLI in one-shot mode and streams the assistant's text, block by
//! block, into a channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use fleetscan_claude::{ClaudeExecutor, PermissionMode};
//! use tokio::sync::mpsc;
//!
//! async fn run_agent() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = ClaudeExecutor::new("claude")
//!         .with_permission_mode(PermissionMode::AcceptEdits);
//!
//!     let (tx, mut rx) = mpsc::channel(64);
//!     let printer = tokio::spawn(async move {
//!         while let Some(text) = rx.recv().await {
//!             print!("{}", text);
//!         }
//!     });
//!
//!     let result = executor.stream(Path::new("."), "What is 2 + 2?", tx).await?;
//!     printer.await?;
//!     println!("Session ID: {:?}", result.session_id);
//!     Ok(())
//! }
//! ```

mod error;
mod executor;
mod types;

// Re-export main types
pub use error::ClaudeError;
pub use executor::{ClaudeExecutor, ExecutionResult};
pub use types::{AssistantMessage, ClaudeMessage, ContentItem, PermissionMode};
