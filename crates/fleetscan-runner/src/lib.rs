//! Batch orchestration for fleetscan.
//!
//! [`WorkflowRunner`] runs one operation across many service repositories: it admits services
//! through a [`ConcurrencyGate`], streams each [`Worker`] call into that service's tracker, and
//! returns an aggregated [`BatchReport`](fleetscan_core::BatchReport).

mod config;
mod context;
mod gate;
mod prompts;
mod runner;
mod worker;

#[cfg(test)]
mod testing;

pub use config::{ClaudeWorkerConfig, RunnerConfig};
pub use context::BatchContext;
pub use gate::{ConcurrencyGate, Slot};
pub use prompts::build_prompt;
pub use runner::WorkflowRunner;
pub use worker::{ClaudeWorker, Worker, WorkerError};
