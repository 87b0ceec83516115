//! Fleetscan CLI - run one analysis across many service repositories.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fleetscan_core::{OperationKind, ProgressEvent, TrackerState};
use fleetscan_runner::{ClaudeWorker, ClaudeWorkerConfig, RunnerConfig, WorkflowRunner};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

/// Fleetscan - batch repository analysis driven by Claude Code
#[derive(Parser)]
#[command(name = "fleetscan")]
#[command(about = "Run fork, status, test, dependency and vulnerability analysis across services", long_about = None)]
struct Cli {
    /// Maximum services analysed at once
    #[arg(short, long, global = true, default_value_t = 2)]
    concurrency: usize,

    /// Per-service timeout in seconds (no limit when omitted)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the claude CLI binary
    #[arg(long, global = true, env = "FLEETSCAN_CLAUDE_PATH", default_value = "claude")]
    claude_path: String,

    /// Model to use
    #[arg(long, global = true, env = "FLEETSCAN_MODEL")]
    model: Option<String>,

    /// Directory holding one checkout per service
    #[arg(long, global = true, env = "FLEETSCAN_REPOS_ROOT", default_value = "./repos")]
    repos_root: PathBuf,

    /// Organization that owns the service repositories
    #[arg(long, global = true, env = "FLEETSCAN_ORGANIZATION", default_value = "azure")]
    organization: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ServiceArgs {
    /// Comma-separated service names
    #[arg(short, long, value_delimiter = ',', required = true)]
    services: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fork upstream repositories and initialize branches
    Fork(ServiceArgs),

    /// Collect issue, pull request and workflow status
    Status(ServiceArgs),

    /// Run test suites
    Test(ServiceArgs),

    /// Scan for outdated dependencies
    Depends(ServiceArgs),

    /// Scan for known vulnerabilities
    Vulns(ServiceArgs),
}

impl Commands {
    fn into_parts(self) -> (OperationKind, Vec<String>) {
        match self {
            Self::Fork(args) => (OperationKind::Fork, args.services),
            Self::Status(args) => (OperationKind::Status, args.services),
            Self::Test(args) => (OperationKind::Test, args.services),
            Self::Depends(args) => (OperationKind::Depends, args.services),
            Self::Vulns(args) => (OperationKind::Vulns, args.services),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = RunnerConfig::default().with_concurrency(cli.concurrency);
    if let Some(secs) = cli.timeout_secs {
        config = config.with_service_timeout(Duration::from_secs(secs));
    }

    let worker = ClaudeWorker::new(ClaudeWorkerConfig {
        claude_path: cli.claude_path,
        model: cli.model,
        repos_root: cli.repos_root,
        organization: cli.organization,
    });

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let runner = WorkflowRunner::new(Arc::new(worker), config).with_progress(progress_tx);
    let progress = tokio::spawn(log_progress(progress_rx));

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling batch");
            ctrl_c_cancel.cancel();
        }
    });

    let (kind, services) = cli.command.into_parts();
    let report = runner.run_with_cancel(services, kind, cancel).await?;

    // Close the progress channel so the logger drains and exits.
    drop(runner);
    let _ = progress.await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render::render_report(&report));
    }

    Ok(())
}

async fn log_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match event.state {
            TrackerState::Pending => {}
            TrackerState::Running | TrackerState::Parsing => {
                if event.chunks == 0 {
                    info!(service = %event.service, "Started");
                } else if let Some(partial) = &event.partial {
                    info!(
                        service = %event.service,
                        chunks = event.chunks,
                        counts = %render::format_counts(&partial.counts),
                        "In progress"
                    );
                }
            }
            TrackerState::Done => info!(service = %event.service, "Done"),
            TrackerState::Failed => {
                let reason = event
                    .failure
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                warn!(service = %event.service, reason = %reason, "Failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_services() {
        let cli = Cli::parse_from([
            "fleetscan",
            "vulns",
            "--services",
            "partition,legal",
            "--concurrency",
            "3",
            "--json",
        ]);
        assert_eq!(cli.concurrency, 3);
        assert!(cli.json);
        let (kind, services) = cli.command.into_parts();
        assert_eq!(kind, OperationKind::Vulns);
        assert_eq!(services, vec!["partition", "legal"]);
    }

    #[test]
    fn test_services_required() {
        assert!(Cli::try_parse_from(["fleetscan", "depends"]).is_err());
    }

    #[test]
    fn test_cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
