//! Typed results extracted from worker text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::OperationKind;

/// Non-negative counts keyed by count field (see [`OperationKind::count_fields`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counts(BTreeMap<String, u64>);

impl Counts {
    /// Create empty counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a count, if reported.
    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    /// Set a count.
    pub fn set(&mut self, key: impl Into<String>, value: u64) {
        self.0.insert(key.into(), value);
    }

    /// Add `value` to a count, starting from zero.
    ///
    /// Returns the new value, or `None` (leaving the count unchanged) on overflow.
    pub fn checked_add(&mut self, key: &str, value: u64) -> Option<u64> {
        let current = self.get(key).unwrap_or(0);
        let sum = current.checked_add(value)?;
        self.0.insert(key.to_string(), sum);
        Some(sum)
    }

    /// Add every count of `other` into `self`, failing on the first overflowing field.
    pub fn checked_merge(&mut self, other: &Counts) -> Option<()> {
        for (key, value) in other.iter() {
            self.checked_add(key, value)?;
        }
        Some(())
    }

    /// Add every count of `other` into `self`, clamping at `u64::MAX`.
    pub fn saturating_merge(&mut self, other: &Counts) {
        for (key, value) in other.iter() {
            let entry = self.0.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(value);
        }
    }

    /// Sum of all counts, clamped at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.0.values().fold(0, |acc, v| acc.saturating_add(*v))
    }

    /// Iterate counts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Whether no count was reported.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for Counts {
    fn from_iter<T: IntoIterator<Item = (K, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// One entry of a top-findings block (an outdated dependency or a CVE).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier used for cross-service overlap (dependency coordinate or CVE id).
    pub id: String,
    /// Version currently in use.
    pub current: Option<String>,
    /// Version the worker recommends moving to.
    pub recommended: Option<String>,
    /// Update level (`major`/`minor`/`patch`) or severity (`critical`, `high`, ...).
    pub category: Option<String>,
    /// Build module the finding was reported in.
    pub module: Option<String>,
    /// Affected package, for CVE findings.
    pub package: Option<String>,
}

impl Finding {
    /// Create a finding with only an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Structured block kinds the grammar recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// `✓ {service}: Analysis complete - ...` line.
    Headline,
    /// `Total: Critical=.., High=.., Medium=..` line.
    SeverityTotals,
    /// `Total:/Outdated:/Affected: {n} dependencies` lines.
    DependencyTotals,
    /// `MODULE_BREAKDOWN` ... `END_MODULE_BREAKDOWN`.
    ModuleBreakdown,
    /// `TOP_UPDATES`/`TOP_CVES` ... `END_*`.
    TopFindings,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Headline => "headline",
            Self::SeverityTotals => "severity totals",
            Self::DependencyTotals => "dependency totals",
            Self::ModuleBreakdown => "module breakdown",
            Self::TopFindings => "top findings",
        };
        f.write_str(s)
    }
}

/// A block that was recognized but dropped because of a malformed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedBlock {
    /// Which block.
    pub block: BlockKind,
    /// 1-based line number where the problem was found.
    pub line: usize,
    /// What was wrong.
    pub reason: String,
}

/// A disagreement between two reported counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMismatch {
    /// Count field (or `dependencies`) that disagrees.
    pub field: String,
    /// Value reported as the total.
    pub reported: u64,
    /// Value it was checked against (headline count, module sum, or affected dependencies).
    pub derived: u64,
}

/// Whether the counts inside a summary agree with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "mismatches", rename_all = "snake_case")]
pub enum Consistency {
    #[default]
    Consistent,
    /// Counts contradict each other; the summary is kept but flagged.
    Inconsistent(Vec<CountMismatch>),
}

impl Consistency {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

/// Coverage percentages reported by a test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// Line coverage, 0 to 100.
    pub line: Option<u8>,
    /// Branch coverage, 0 to 100.
    pub branch: Option<u8>,
}

/// Structured result extracted from a service's worker output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSummary {
    /// Operation the summary belongs to.
    pub kind: OperationKind,
    /// Service named by the headline, if one was accepted.
    pub service: Option<String>,
    /// Totals per count field.
    pub counts: Counts,
    /// Total dependencies scanned, when reported.
    pub total_dependencies: Option<u64>,
    /// Outdated (Depends) or vulnerable (Vulns) dependencies, when reported.
    pub affected_dependencies: Option<u64>,
    /// Top findings in reported order.
    pub findings: Vec<Finding>,
    /// Per-module counts.
    pub modules: BTreeMap<String, Counts>,
    /// Test coverage, when a test run reported it.
    pub coverage: Option<Coverage>,
    /// Accepted blocks in order of appearance.
    pub blocks: Vec<BlockKind>,
    /// Recognized blocks that were dropped.
    pub rejected: Vec<RejectedBlock>,
    /// Consistency verdict over the accepted blocks.
    pub consistency: Consistency,
}

impl ParsedSummary {
    /// Create an empty summary for a kind.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            service: None,
            counts: Counts::new(),
            total_dependencies: None,
            affected_dependencies: None,
            findings: Vec::new(),
            modules: BTreeMap::new(),
            coverage: None,
            blocks: Vec::new(),
            rejected: Vec::new(),
            consistency: Consistency::Consistent,
        }
    }

    /// Get a count by field key.
    pub fn count(&self, key: &str) -> Option<u64> {
        self.counts.get(key)
    }

    pub fn is_inconsistent(&self) -> bool {
        !self.consistency.is_consistent()
    }

    /// `(affected, total)` used for grading, if the summary carries enough data.
    pub fn affected_ratio(&self) -> Option<(u64, u64)> {
        match self.kind {
            OperationKind::Depends | OperationKind::Vulns => {
                Some((self.affected_dependencies?, self.total_dependencies?))
            }
            OperationKind::Test => {
                let failed = self.count("failed")?;
                let passed = self.count("passed").unwrap_or(0);
                Some((failed, passed.checked_add(failed)?))
            }
            OperationKind::Fork | OperationKind::Status => None,
        }
    }
}

/// Why a stream could not be turned into a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnparsedReason {
    /// No recognized block in the text.
    NoStructuredOutput,
    /// Blocks were recognized but every one was malformed.
    MalformedBlocks,
}

impl UnparsedReason {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoStructuredOutput => "no-structured-output",
            Self::MalformedBlocks => "malformed-blocks",
        }
    }
}

impl fmt::Display for UnparsedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Raw text kept for diagnostics when no summary could be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnparsedResult {
    pub raw: String,
    pub reason: UnparsedReason,
    /// Blocks that were recognized and rejected.
    pub rejected: Vec<RejectedBlock>,
}

/// Outcome of parsing a service's accumulated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    Parsed(ParsedSummary),
    Unparsed(UnparsedResult),
}

impl ParseOutcome {
    /// The summary, if parsing succeeded.
    pub fn summary(&self) -> Option<&ParsedSummary> {
        match self {
            Self::Parsed(summary) => Some(summary),
            Self::Unparsed(_) => None,
        }
    }

    /// Consume into the summary, if parsing succeeded.
    pub fn into_summary(self) -> Option<ParsedSummary> {
        match self {
            Self::Parsed(summary) => Some(summary),
            Self::Unparsed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_merge() {
        let mut a: Counts = [("critical", 1), ("high", 2)].into_iter().collect();
        let b: Counts = [("high", 3), ("medium", 4)].into_iter().collect();
        assert_eq!(a.checked_merge(&b), Some(()));
        assert_eq!(a.get("critical"), Some(1));
        assert_eq!(a.get("high"), Some(5));
        assert_eq!(a.get("medium"), Some(4));
        assert_eq!(a.total(), 10);
    }

    #[test]
    fn test_counts_overflow() {
        let mut a: Counts = [("critical", u64::MAX)].into_iter().collect();
        assert_eq!(a.checked_add("critical", 1), None);
        assert_eq!(a.get("critical"), Some(u64::MAX));
        assert_eq!(a.checked_add("high", 2), Some(2));

        let b: Counts = [("critical", 7)].into_iter().collect();
        assert_eq!(a.clone().checked_merge(&b), None);
        a.saturating_merge(&b);
        assert_eq!(a.get("critical"), Some(u64::MAX));
        assert_eq!(a.total(), u64::MAX);
    }

    #[test]
    fn test_affected_ratio_overflow_has_no_ratio() {
        let mut summary = ParsedSummary::new(OperationKind::Test);
        summary.counts.set("passed", u64::MAX);
        summary.counts.set("failed", 1);
        assert_eq!(summary.affected_ratio(), None);
    }

    #[test]
    fn test_affected_ratio_for_tests() {
        let mut summary = ParsedSummary::new(OperationKind::Test);
        summary.counts.set("passed", 95);
        summary.counts.set("failed", 5);
        assert_eq!(summary.affected_ratio(), Some((5, 100)));
    }

    #[test]
    fn test_affected_ratio_needs_totals() {
        let mut summary = ParsedSummary::new(OperationKind::Depends);
        summary.affected_dependencies = Some(3);
        assert_eq!(summary.affected_ratio(), None);
        summary.total_dependencies = Some(60);
        assert_eq!(summary.affected_ratio(), Some((3, 60)));
    }
}
