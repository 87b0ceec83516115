//! Claude Code executor streaming assistant text.
//!
//! Runs the CLI in one-shot mode with streaming JSON output and forwards every assistant
//! text block, in order, to a channel.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::ClaudeError;
use crate::types::{ClaudeMessage, PermissionMode};

/// Result of a Claude Code execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// The session ID from Claude Code.
    pub session_id: Option<String>,

    /// The model reported by the CLI.
    pub model_used: Option<String>,

    /// Duration reported by the CLI, in milliseconds.
    pub duration_ms: Option<u64>,

    /// Text chunks forwarded to the caller.
    pub chunks: usize,
}

/// Executor for Claude Code.
///
/// The child process is killed when the future returned by [`stream`](Self::stream) is
/// dropped, so a caller can abandon a run by dropping it (timeout, cancellation).
#[derive(Debug, Clone)]
pub struct ClaudeExecutor {
    /// Path to the Claude CLI executable.
    claude_path: String,

    /// Permission mode to use.
    permission_mode: PermissionMode,

    /// Model to use (optional).
    model: Option<String>,

    /// Tools the agent may use without asking.
    allowed_tools: Vec<String>,

    /// System prompt (optional).
    system_prompt: Option<String>,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,
}

impl ClaudeExecutor {
    /// Create a new executor with the given path to the Claude CLI.
    ///
    /// The path can be just "claude" to use PATH lookup, or a full path.
    pub fn new(claude_path: impl Into<String>) -> Self {
        Self {
            claude_path: claude_path.into(),
            permission_mode: PermissionMode::Default,
            model: None,
            allowed_tools: Vec::new(),
            system_prompt: None,
            env_vars: Vec::new(),
        }
    }

    /// Set the permission mode.
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Allow a tool (e.g. `Bash`, `Read`) without prompting.
    pub fn with_allowed_tool(mut self, tool: impl Into<String>) -> Self {
        self.allowed_tools.push(tool.into());
        self
    }

    /// Set a system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn claude_path(&self) -> &str {
        &self.claude_path
    }

    fn command(&self, working_dir: &Path, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.claude_path);

        // stream-json requires --verbose in print mode
        cmd.arg("--output-format=stream-json").arg("--verbose");

        if self.permission_mode != PermissionMode::Default {
            cmd.arg("--permission-mode")
                .arg(self.permission_mode.to_string());
        }

        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }

        if !self.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(self.allowed_tools.join(","));
        }

        if let Some(system) = &self.system_prompt {
            cmd.arg("--append-system-prompt").arg(system);
        }

        cmd.arg("--print").arg(prompt);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(working_dir)
            .kill_on_drop(true);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        cmd
    }

    /// Run `prompt` in `working_dir`, sending each assistant text block to `chunks`.
    ///
    /// Blocks are sent in the order the CLI prints them. Each block is terminated with a
    /// newline so consecutive blocks never fuse into one line.
    pub async fn stream(
        &self,
        working_dir: &Path,
        prompt: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<ExecutionResult, ClaudeError> {
        info!(
            claude_path = %self.claude_path,
            working_dir = %working_dir.display(),
            prompt_len = prompt.len(),
            "Spawning Claude process"
        );

        let mut cmd = self.command(working_dir, prompt);
        debug!("Full command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            error!(error = %e, "Failed to spawn Claude process");
            if e.kind() == ErrorKind::NotFound {
                ClaudeError::ClaudeNotFound(self.claude_path.clone())
            } else {
                ClaudeError::SpawnError(e)
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClaudeError::ProcessError("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClaudeError::ProcessError("Failed to get stderr".to_string()))?;

        // Ends on its own once the child closes stderr.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            warn!(stderr = %trimmed, "Claude stderr");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Error reading Claude stderr");
                        break;
                    }
                }
            }
        });

        // Read inline: dropping this future drops the child and kills it.
        let mut result = ExecutionResult::default();
        let mut reported_error = None;
        let mut lines = BufReader::new(stdout).lines();
        let mut message_count = 0u64;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(total_messages = message_count, "Claude stdout closed (EOF)");
                    break;
                }
                Err(e) => {
                    return Err(ClaudeError::ProcessError(format!(
                        "reading stdout: {}",
                        e
                    )))
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            message_count += 1;

            let message = match serde_json::from_str::<ClaudeMessage>(trimmed) {
                Ok(message) => message,
                Err(e) => {
                    let preview: String = trimmed.chars().take(200).collect();
                    warn!(error = %e, preview = %preview, "Failed to parse Claude message");
                    continue;
                }
            };

            if result.session_id.is_none() {
                result.session_id = message.session_id().map(str::to_string);
            }

            match &message {
                ClaudeMessage::System { model, .. } => {
                    if let Some(model) = model {
                        debug!(model = %model, "Claude session initialized");
                        result.model_used = Some(model.clone());
                    }
                }
                ClaudeMessage::Assistant { .. } => {
                    for text in message.assistant_text() {
                        let mut chunk = text.to_string();
                        if !chunk.ends_with('\n') {
                            chunk.push('\n');
                        }
                        chunks
                            .send(chunk)
                            .await
                            .map_err(|_| ClaudeError::ChannelClosed)?;
                        result.chunks += 1;
                    }
                }
                ClaudeMessage::Result {
                    is_error,
                    duration_ms,
                    error,
                    result: output,
                    ..
                } => {
                    result.duration_ms = *duration_ms;
                    if is_error.unwrap_or(false) {
                        reported_error = Some(
                            error
                                .clone()
                                .or_else(|| output.as_ref().map(|v| v.to_string()))
                                .unwrap_or_else(|| "unknown error".to_string()),
                        );
                    }
                }
                ClaudeMessage::User { .. } | ClaudeMessage::Unknown(_) => {}
            }
        }

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);
        info!(
            exit_code = exit_code,
            success = status.success(),
            chunks = result.chunks,
            "Claude process exited"
        );

        if let Some(message) = reported_error {
            return Err(ClaudeError::ProcessError(message));
        }
        if !status.success() {
            return Err(ClaudeError::ProcessError(format!(
                "Claude exited with code {}",
                exit_code
            )));
        }

        Ok(result)
    }
}

impl Default for ClaudeExecutor {
    fn default() -> Self {
        Self::new("claude")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_builder() {
        let executor = ClaudeExecutor::new("/opt/claude/bin/claude")
            .with_model("sonnet")
            .with_permission_mode(PermissionMode::AcceptEdits)
            .with_allowed_tool("Bash")
            .with_allowed_tool("Read")
            .with_system_prompt("Report in the requested format.")
            .with_env("MAVEN_OPTS", "-Xmx2g");

        assert_eq!(executor.claude_path(), "/opt/claude/bin/claude");
        assert_eq!(executor.model, Some("sonnet".to_string()));
        assert_eq!(executor.permission_mode, PermissionMode::AcceptEdits);
        assert_eq!(executor.allowed_tools, vec!["Bash", "Read"]);
        assert_eq!(executor.env_vars.len(), 1);
    }

    #[test]
    fn test_default_executor() {
        let executor = ClaudeExecutor::default();
        assert_eq!(executor.claude_path(), "claude");
        assert_eq!(executor.permission_mode, PermissionMode::Default);
        assert!(executor.model.is_none());
    }

    #[test]
    fn test_command_args() {
        let executor = ClaudeExecutor::new("claude")
            .with_permission_mode(PermissionMode::BypassPermissions)
            .with_allowed_tool("Bash");
        let cmd = executor.command(Path::new("."), "scan it");
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--output-format=stream-json",
                "--verbose",
                "--permission-mode",
                "bypassPermissions",
                "--allowedTools",
                "Bash",
                "--print",
                "scan it",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_cli_is_not_found() {
        let executor = ClaudeExecutor::new("/nonexistent/fleetscan/claude");
        let (tx, _rx) = mpsc::channel(4);
        let err = executor
            .stream(Path::new("."), "hello", tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaudeError::ClaudeNotFound(_)));
        assert!(err.is_unavailable());
    }
}
