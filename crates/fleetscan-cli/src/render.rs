//! Plain-text report rendering.

use std::fmt::Write;

use fleetscan_core::{BatchReport, Counts, ServiceOutcome, ServiceResult};

/// `critical=3 high=5` in key order, or `-` when empty.
pub fn format_counts(counts: &Counts) -> String {
    if counts.is_empty() {
        return "-".to_string();
    }
    counts
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn detail(entry: &ServiceResult) -> String {
    match &entry.outcome {
        ServiceOutcome::Summary(summary) => {
            let mut detail = format_counts(&summary.counts);
            if let (Some(affected), Some(total)) =
                (summary.affected_dependencies, summary.total_dependencies)
            {
                let _ = write!(detail, " ({}/{} dependencies)", affected, total);
            }
            if let Some(coverage) = &summary.coverage {
                let percent = |p: Option<u8>| p.map_or("-".to_string(), |p| format!("{}%", p));
                let _ = write!(
                    detail,
                    " (coverage {} line / {} branch)",
                    percent(coverage.line),
                    percent(coverage.branch)
                );
            }
            if summary.is_inconsistent() {
                detail.push_str(" [inconsistent]");
            }
            detail
        }
        ServiceOutcome::Unparsed(unparsed) => format!("unparsed: {}", unparsed.reason),
        ServiceOutcome::Error(reason) => reason.to_string(),
    }
}

/// Render the report as a table followed by the aggregate sections.
pub fn render_report(report: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Batch {} ({}, {} services)",
        report.batch_id.short(),
        report.kind,
        report.len()
    );
    let _ = writeln!(out, "{:<24}  {:<7}  {:<5}  {}", "SERVICE", "STATE", "GRADE", "RESULT");
    let _ = writeln!(out, "{}", "-".repeat(80));

    for entry in &report.entries {
        let grade = entry
            .grade
            .map(|g| g.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<24}  {:<7}  {:<5}  {}",
            entry.service,
            entry.state.to_string(),
            grade,
            detail(entry)
        );
    }

    let Some(aggregate) = &report.aggregate else {
        return out;
    };

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Totals ({} of {} services): {}",
        aggregate.completed.len(),
        report.len(),
        format_counts(&aggregate.totals)
    );
    if let Some(grade) = aggregate.overall_grade {
        let _ = writeln!(
            out,
            "Overall grade: {} ({}) - {}/{} dependencies",
            grade,
            grade.risk_label(),
            aggregate.affected_dependencies,
            aggregate.total_dependencies
        );
    }

    if !aggregate.cross_cutting.is_empty() {
        let _ = writeln!(out, "\nCross-cutting findings:");
        for finding in &aggregate.cross_cutting {
            let category = finding
                .category
                .as_deref()
                .map(|c| format!(" [{}]", c))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {}{} - {} services: {}",
                finding.id,
                category,
                finding.service_count(),
                finding.services.join(", ")
            );
        }
    }

    if !aggregate.inconsistent.is_empty() {
        let _ = writeln!(
            out,
            "\nInconsistent summaries: {}",
            aggregate.inconsistent.join(", ")
        );
    }

    if !aggregate.failed.is_empty() {
        let _ = writeln!(out, "\nFailed services:");
        for failed in &aggregate.failed {
            let _ = writeln!(out, "  {}: {}", failed.service, failed.reason);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetscan_core::{
        parse, BatchId, FailureReason, OperationKind, ResultAggregator, TrackerState,
    };

    fn done(service: &str, text: &str) -> ServiceResult {
        let summary = parse(text, OperationKind::Vulns).into_summary().unwrap();
        ServiceResult {
            service: service.to_string(),
            kind: OperationKind::Vulns,
            state: TrackerState::Done,
            outcome: ServiceOutcome::Summary(summary),
            grade: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_format_counts() {
        let counts: Counts = [("high", 5), ("critical", 3)].into_iter().collect();
        assert_eq!(format_counts(&counts), "critical=3 high=5");
        assert_eq!(format_counts(&Counts::new()), "-");
    }

    #[test]
    fn test_render_report() {
        let cve = "TOP_CVES\n1. CVE-2021-44228\n   Severity: Critical\nEND_TOP_CVES\n";
        let partition = format!(
            "✓ partition: Analysis complete - 3 critical, 5 high, 12 medium\nTotal: 100 dependencies\nAffected: 4 dependencies\n{}",
            cve
        );
        let legal = format!("✓ legal: Analysis complete - 1 critical, 0 high, 0 medium\n{}", cve);
        let entries = vec![
            done("partition", &partition),
            done("legal", &legal),
            ServiceResult {
                service: "storage".to_string(),
                kind: OperationKind::Vulns,
                state: TrackerState::Failed,
                outcome: ServiceOutcome::Error(FailureReason::Timeout),
                grade: None,
                started_at: None,
                finished_at: None,
            },
        ];
        let report = ResultAggregator::new().aggregate(BatchReport::new(
            BatchId::new("0123456789abcdef"),
            OperationKind::Vulns,
            entries,
            Utc::now(),
        ));

        let text = render_report(&report);
        assert!(text.starts_with("Batch 01234567 (vulns, 3 services)"));
        assert!(text.contains("critical=3 high=5 medium=12 (4/100 dependencies)"));
        assert!(text.contains("Totals (2 of 3 services): critical=4 high=5 medium=12"));
        assert!(text.contains("Overall grade: A (EXCELLENT)"));
        assert!(text.contains("CVE-2021-44228 [critical] - 2 services: partition, legal"));
        assert!(text.contains("storage: timeout"));
    }

    #[test]
    fn test_detail_shows_coverage() {
        let text = "✓ legal: Analysis complete - 40 passed, 1 failed, 0 skipped tests, 81% line coverage";
        let summary = parse(text, OperationKind::Test).into_summary().unwrap();
        let entry = ServiceResult {
            service: "legal".to_string(),
            kind: OperationKind::Test,
            state: TrackerState::Done,
            outcome: ServiceOutcome::Summary(summary),
            grade: None,
            started_at: None,
            finished_at: None,
        };
        assert_eq!(
            detail(&entry),
            "failed=1 passed=40 skipped=0 (coverage 81% line / - branch)"
        );
    }
}
