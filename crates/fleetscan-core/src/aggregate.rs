//! Cross-service aggregation of a batch report.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::report::{BatchReport, ServiceResult};
use crate::summary::Counts;
use crate::{FailureReason, Grade};

/// A service left out of the totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedService {
    pub service: String,
    pub reason: FailureReason,
}

/// A finding identifier reported by two or more services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossCuttingFinding {
    pub id: String,
    /// Affected services in submission order.
    pub services: Vec<String>,
    /// Category from the first service that reported one.
    pub category: Option<String>,
}

impl CrossCuttingFinding {
    /// Number of distinct services reporting this identifier.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

/// Batch-wide figures computed from the `Done` services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    /// Per-field sums over `Done` services.
    pub totals: Counts,
    /// Summed total dependencies over graded services.
    pub total_dependencies: u64,
    /// Summed outdated/affected dependencies over graded services.
    pub affected_dependencies: u64,
    /// Services that reached `Done`, in submission order.
    pub completed: Vec<String>,
    /// Services excluded from totals, with their reasons.
    pub failed: Vec<FailedService>,
    /// `Done` services whose summary is flagged inconsistent.
    pub inconsistent: Vec<String>,
    /// Identifiers shared by services; most widespread first, then by identifier.
    pub cross_cutting: Vec<CrossCuttingFinding>,
    /// Grade over the summed ratios, if any service could be graded.
    pub overall_grade: Option<Grade>,
}

/// Merges per-service results into batch-wide figures.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator;

impl ResultAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Grade every entry and attach the aggregate summary.
    pub fn aggregate(&self, mut report: BatchReport) -> BatchReport {
        for entry in &mut report.entries {
            entry.grade = grade_entry(entry);
        }
        report.aggregate = Some(self.summarize(&report.entries));
        report
    }

    /// Compute the aggregate summary of a set of entries.
    pub fn summarize(&self, entries: &[ServiceResult]) -> AggregateSummary {
        let mut aggregate = AggregateSummary::default();
        let mut graded = false;
        let mut overlaps: BTreeMap<&str, CrossCuttingFinding> = BTreeMap::new();

        for entry in entries {
            let summary = match (entry.is_done(), entry.summary()) {
                (true, Some(summary)) => summary,
                _ => {
                    aggregate.failed.push(FailedService {
                        service: entry.service.clone(),
                        reason: entry
                            .failure_reason()
                            .unwrap_or(FailureReason::Cancelled),
                    });
                    continue;
                }
            };

            aggregate.completed.push(entry.service.clone());
            // Worker-reported numbers are unbounded; clamp rather than wrap.
            aggregate.totals.saturating_merge(&summary.counts);
            if summary.is_inconsistent() {
                aggregate.inconsistent.push(entry.service.clone());
            }
            if let Some((affected, total)) = summary.affected_ratio() {
                aggregate.affected_dependencies =
                    aggregate.affected_dependencies.saturating_add(affected);
                aggregate.total_dependencies = aggregate.total_dependencies.saturating_add(total);
                graded = true;
            }

            for finding in &summary.findings {
                let overlap = overlaps
                    .entry(finding.id.as_str())
                    .or_insert_with(|| CrossCuttingFinding {
                        id: finding.id.clone(),
                        services: Vec::new(),
                        category: None,
                    });
                if !overlap.services.contains(&entry.service) {
                    overlap.services.push(entry.service.clone());
                }
                if overlap.category.is_none() {
                    overlap.category = finding.category.clone();
                }
            }
        }

        let mut cross_cutting: Vec<_> = overlaps
            .into_values()
            .filter(|f| f.service_count() >= 2)
            .collect();
        // Stable: ties keep the map's identifier order.
        cross_cutting.sort_by_key(|f| Reverse(f.service_count()));
        aggregate.cross_cutting = cross_cutting;

        if graded {
            aggregate.overall_grade = Some(Grade::from_ratio(
                aggregate.affected_dependencies,
                aggregate.total_dependencies,
            ));
        }

        aggregate
    }
}

fn grade_entry(entry: &ServiceResult) -> Option<Grade> {
    if !entry.is_done() {
        return None;
    }
    let (affected, total) = entry.summary()?.affected_ratio()?;
    Some(Grade::from_ratio(affected, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ServiceOutcome;
    use crate::summary::{Consistency, CountMismatch, Finding, ParsedSummary};
    use crate::{BatchId, OperationKind, TrackerState};
    use chrono::Utc;

    fn done(service: &str, summary: ParsedSummary) -> ServiceResult {
        ServiceResult {
            service: service.to_string(),
            kind: summary.kind,
            state: TrackerState::Done,
            outcome: ServiceOutcome::Summary(summary),
            grade: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn failed(service: &str, reason: FailureReason) -> ServiceResult {
        ServiceResult {
            service: service.to_string(),
            kind: OperationKind::Vulns,
            state: TrackerState::Failed,
            outcome: ServiceOutcome::Error(reason),
            grade: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn vulns(critical: u64, high: u64, findings: &[&str]) -> ParsedSummary {
        let mut summary = ParsedSummary::new(OperationKind::Vulns);
        summary.counts.set("critical", critical);
        summary.counts.set("high", high);
        summary.findings = findings.iter().map(|id| Finding::new(*id)).collect();
        summary
    }

    fn report(entries: Vec<ServiceResult>) -> BatchReport {
        BatchReport::new(
            BatchId::new("batch-1"),
            OperationKind::Vulns,
            entries,
            Utc::now(),
        )
    }

    #[test]
    fn test_cross_cutting_cve() {
        let entries = vec![
            done("partition", vulns(1, 0, &["CVE-2021-44228"])),
            done("legal", vulns(1, 2, &["CVE-2021-44228", "CVE-2022-22965"])),
        ];
        let aggregate = ResultAggregator::new().summarize(&entries);

        assert_eq!(aggregate.cross_cutting.len(), 1);
        let log4shell = &aggregate.cross_cutting[0];
        assert_eq!(log4shell.id, "CVE-2021-44228");
        assert_eq!(log4shell.service_count(), 2);
        assert_eq!(log4shell.services, vec!["partition", "legal"]);
    }

    #[test]
    fn test_cross_cutting_order() {
        let entries = vec![
            done("a", vulns(0, 0, &["CVE-B", "CVE-A", "CVE-C"])),
            done("b", vulns(0, 0, &["CVE-B", "CVE-A", "CVE-C"])),
            done("c", vulns(0, 0, &["CVE-C", "CVE-C"])),
        ];
        let aggregate = ResultAggregator::new().summarize(&entries);
        let ids: Vec<_> = aggregate
            .cross_cutting
            .iter()
            .map(|f| (f.id.as_str(), f.service_count()))
            .collect();
        assert_eq!(ids, vec![("CVE-C", 3), ("CVE-A", 2), ("CVE-B", 2)]);
    }

    #[test]
    fn test_totals_skip_failed_services() {
        let entries = vec![
            done("partition", vulns(3, 5, &[])),
            failed("storage", FailureReason::Timeout),
            done("legal", vulns(1, 1, &[])),
        ];
        let aggregate = ResultAggregator::new().summarize(&entries);

        assert_eq!(aggregate.totals.get("critical"), Some(4));
        assert_eq!(aggregate.totals.get("high"), Some(6));
        assert_eq!(aggregate.completed, vec!["partition", "legal"]);
        assert_eq!(
            aggregate.failed,
            vec![FailedService {
                service: "storage".to_string(),
                reason: FailureReason::Timeout,
            }]
        );
        assert_eq!(aggregate.overall_grade, None);
    }

    #[test]
    fn test_inconsistent_services_listed() {
        let mut summary = vulns(2, 0, &[]);
        summary.consistency = Consistency::Inconsistent(vec![CountMismatch {
            field: "critical".to_string(),
            reported: 2,
            derived: 1,
        }]);
        let aggregate = ResultAggregator::new().summarize(&[done("wellbore", summary)]);
        assert_eq!(aggregate.inconsistent, vec!["wellbore"]);
        assert_eq!(aggregate.totals.get("critical"), Some(2));
    }

    #[test]
    fn test_grades() {
        let mut a = ParsedSummary::new(OperationKind::Depends);
        a.total_dependencies = Some(100);
        a.affected_dependencies = Some(5);
        let mut f = ParsedSummary::new(OperationKind::Depends);
        f.total_dependencies = Some(20);
        f.affected_dependencies = Some(15);
        let ungraded = ParsedSummary::new(OperationKind::Depends);

        let report = ResultAggregator::new().aggregate(report(vec![
            done("storage", a),
            done("legal", f),
            done("file", ungraded),
        ]));

        assert_eq!(report.entry("storage").unwrap().grade, Some(Grade::A));
        assert_eq!(report.entry("legal").unwrap().grade, Some(Grade::F));
        assert_eq!(report.entry("file").unwrap().grade, None);

        let aggregate = report.aggregate.unwrap();
        assert_eq!(aggregate.affected_dependencies, 20);
        assert_eq!(aggregate.total_dependencies, 120);
        assert_eq!(aggregate.overall_grade, Some(Grade::C));
    }

    #[test]
    fn test_huge_counts_clamp() {
        let mut big = vulns(u64::MAX, 1, &[]);
        big.total_dependencies = Some(u64::MAX);
        big.affected_dependencies = Some(u64::MAX);
        let entries = vec![done("partition", big.clone()), done("legal", big)];

        let aggregate = ResultAggregator::new().summarize(&entries);
        assert_eq!(aggregate.totals.get("critical"), Some(u64::MAX));
        assert_eq!(aggregate.totals.get("high"), Some(2));
        assert_eq!(aggregate.total_dependencies, u64::MAX);
        assert_eq!(aggregate.affected_dependencies, u64::MAX);
        assert_eq!(aggregate.overall_grade, Some(Grade::F));
        assert_eq!(aggregate.completed, vec!["partition", "legal"]);
    }
}
