//! Operation kinds, service tasks and batch requests.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Kind of per-repository analysis a batch performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Fork the upstream repository and initialize branches.
    Fork,
    /// Collect issue, pull request and workflow status.
    Status,
    /// Run the test suite.
    Test,
    /// Scan for outdated dependencies.
    Depends,
    /// Scan for known vulnerabilities.
    Vulns,
}

/// A named count a worker reports for an operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountField {
    /// Key used in summaries and reports.
    pub key: &'static str,
    /// Lower-case stem matched as a prefix of the label in worker text.
    pub stem: &'static str,
}

const fn field(key: &'static str, stem: &'static str) -> CountField {
    CountField { key, stem }
}

const STATUS_FIELDS: &[CountField] = &[
    field("issues", "issue"),
    field("pull_requests", "pull request"),
    field("failed_workflows", "failed workflow"),
];

const TEST_FIELDS: &[CountField] = &[
    field("passed", "passed"),
    field("failed", "failed"),
    field("skipped", "skipped"),
];

const DEPENDS_FIELDS: &[CountField] = &[
    field("major", "major"),
    field("minor", "minor"),
    field("patch", "patch"),
];

const VULNS_FIELDS: &[CountField] = &[
    field("critical", "critical"),
    field("high", "high"),
    field("medium", "medium"),
    field("low", "low"),
];

impl OperationKind {
    /// All kinds, in command order.
    pub const ALL: [OperationKind; 5] = [
        Self::Fork,
        Self::Status,
        Self::Test,
        Self::Depends,
        Self::Vulns,
    ];

    /// Lower-case name as used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fork => "fork",
            Self::Status => "status",
            Self::Test => "test",
            Self::Depends => "depends",
            Self::Vulns => "vulns",
        }
    }

    /// Count fields in column order.
    pub fn count_fields(&self) -> &'static [CountField] {
        match self {
            Self::Fork => &[],
            Self::Status => STATUS_FIELDS,
            Self::Test => TEST_FIELDS,
            Self::Depends => DEPENDS_FIELDS,
            Self::Vulns => VULNS_FIELDS,
        }
    }

    /// Marker opening the top-findings block, if this kind reports findings.
    pub fn findings_marker(&self) -> Option<&'static str> {
        match self {
            Self::Depends => Some("TOP_UPDATES"),
            Self::Vulns => Some("TOP_CVES"),
            _ => None,
        }
    }

    /// Label of the dependency-totals line that feeds grading (`Outdated:` / `Affected:`).
    pub fn affected_label(&self) -> Option<&'static str> {
        match self {
            Self::Depends => Some("outdated"),
            Self::Vulns => Some("affected"),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One service's share of a batch. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTask {
    /// Service (repository) name, unique within the batch.
    pub service: String,

    /// Operation to perform.
    pub kind: OperationKind,

    /// When the batch containing this task was accepted.
    pub submitted_at: DateTime<Utc>,
}

impl ServiceTask {
    /// Create a new ServiceTask.
    pub fn new(service: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            service: service.into(),
            kind,
            submitted_at: Utc::now(),
        }
    }
}

/// A validated batch request: distinct, non-empty service names in caller order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    kind: OperationKind,
    tasks: Vec<ServiceTask>,
}

impl BatchRequest {
    /// Validate the service list and create one task per service.
    pub fn new<I, S>(services: I, kind: OperationKind) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let submitted_at = Utc::now();
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();

        for service in services {
            let service: String = service.into();
            let name = service.trim();
            if name.is_empty() {
                return Err(CoreError::EmptyServiceName);
            }
            if !seen.insert(name.to_string()) {
                return Err(CoreError::DuplicateService(name.to_string()));
            }
            tasks.push(ServiceTask {
                service: name.to_string(),
                kind,
                submitted_at,
            });
        }

        if tasks.is_empty() {
            return Err(CoreError::EmptyBatch);
        }

        Ok(Self { kind, tasks })
    }

    /// Operation kind shared by every task.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Tasks in submission order.
    pub fn tasks(&self) -> &[ServiceTask] {
        &self.tasks
    }

    /// Service names in submission order.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.service.as_str())
    }

    /// Number of services in the batch.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Always false for a validated request.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
