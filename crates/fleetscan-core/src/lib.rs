//! Fleetscan Core Domain Types
//!
//! This crate contains the pure orchestration domain with no dependencies on:
//! - Async runtimes
//! - Worker processes
//! - Terminal output
//!
//! It covers the worker-output grammar, the per-service tracker state machine, and the
//! aggregation of per-service results into a batch report.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod grade;
pub mod grammar;
pub mod ids;
pub mod report;
pub mod status;
pub mod summary;
pub mod task;
pub mod tracker;

// Re-export commonly used types
pub use aggregate::{AggregateSummary, CrossCuttingFinding, FailedService, ResultAggregator};
pub use error::CoreError;
pub use event::ProgressEvent;
pub use grade::Grade;
pub use grammar::parse;
pub use ids::BatchId;
pub use report::{BatchReport, ServiceOutcome, ServiceResult};
pub use status::{FailureReason, TrackerState};
pub use summary::{
    Consistency, Counts, Coverage, Finding, ParseOutcome, ParsedSummary, UnparsedReason,
    UnparsedResult,
};
pub use task::{BatchRequest, OperationKind, ServiceTask};
pub use tracker::{ServiceTracker, TrackerSnapshot};
