//! Line grammar for worker output.
//!
//! Workers are instructed to end their analysis with a fixed set of marker lines and fenced
//! blocks. [`parse`] extracts those into a [`ParsedSummary`]; everything else in the text is
//! prose and is ignored.
//!
//! ```text
//! ✓ partition: Analysis complete - 3 critical, 5 high, 12 medium vulnerabilities
//! Total: 120 dependencies
//! Affected: 9 dependencies
//! MODULE_BREAKDOWN
//! core|1|2|7
//! azure|2|3|5
//! END_MODULE_BREAKDOWN
//! TOP_CVES
//! 1. CVE-2021-44228
//!    - Severity: Critical
//!    - Package: org.apache.logging.log4j:log4j-core
//!    - Installed: 2.14.1
//!    - Fixed: 2.17.1
//! END_TOP_CVES
//! ```
//!
//! Each block is accepted or rejected on its own: a malformed or overflowing number drops that
//! block only. When a block kind appears more than once the last accepted occurrence wins.
//! Fenced blocks without their closing marker are treated as still streaming and skipped.
//!
//! The `Total: Critical=..` line is the final tally and takes precedence over headline counts.
//! Every count reported by two accepted blocks is cross-checked, and any disagreement marks
//! the summary inconsistent.
//!
//! Parsing is a pure function of `(text, kind)`.

use std::collections::BTreeMap;

use crate::summary::{
    BlockKind, Consistency, CountMismatch, Counts, Coverage, Finding, ParseOutcome,
    ParsedSummary, RejectedBlock, UnparsedReason, UnparsedResult,
};
use crate::task::CountField;
use crate::OperationKind;

const CHECK_MARKS: [char; 2] = ['✓', '✅'];
const HEADLINE_PHRASE: &str = "analysis complete";
const MODULE_START: &str = "MODULE_BREAKDOWN";
const MODULE_END: &str = "END_MODULE_BREAKDOWN";
const EMPTY_VALUES: [&str; 4] = ["none", "n/a", "-", ""];

/// Maximum findings kept per service.
pub const MAX_FINDINGS: usize = 10;

/// Parse a service's accumulated worker text.
pub fn parse(text: &str, kind: OperationKind) -> ParseOutcome {
    let lines: Vec<&str> = text.lines().collect();
    let mut extraction = Extraction::new(kind);
    let findings_marker = kind.findings_marker();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        let line_no = i + 1;

        if is_marker(line, MODULE_START) {
            if let Some(end) = find_marker(&lines, i + 1, MODULE_END) {
                extraction.module_block(&lines[i + 1..end], line_no + 1);
                i = end + 1;
                continue;
            }
        } else if let Some(marker) = findings_marker.filter(|m| is_marker(line, m)) {
            let end_marker = format!("END_{}", marker);
            if let Some(end) = find_marker(&lines, i + 1, &end_marker) {
                extraction.findings_block(&lines[i + 1..end]);
                i = end + 1;
                continue;
            }
        } else {
            extraction.line(line, line_no);
        }

        i += 1;
    }

    extraction.finish(text)
}

/// Accumulates accepted blocks while scanning.
struct Extraction {
    kind: OperationKind,
    service: Option<String>,
    headline_counts: Option<Counts>,
    coverage: Option<Coverage>,
    severity_totals: Option<Counts>,
    total_dependencies: Option<u64>,
    affected_dependencies: Option<u64>,
    /// Per-module counts and their column sums.
    modules: Option<(BTreeMap<String, Counts>, Counts)>,
    findings: Option<Vec<Finding>>,
    blocks: Vec<BlockKind>,
    rejected: Vec<RejectedBlock>,
}

impl Extraction {
    fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            service: None,
            headline_counts: None,
            coverage: None,
            severity_totals: None,
            total_dependencies: None,
            affected_dependencies: None,
            modules: None,
            findings: None,
            blocks: Vec::new(),
            rejected: Vec::new(),
        }
    }

    fn accept(&mut self, block: BlockKind) {
        self.blocks.push(block);
    }

    fn reject(&mut self, block: BlockKind, line: usize, reason: String) {
        self.rejected.push(RejectedBlock {
            block,
            line,
            reason,
        });
    }

    /// Single-line blocks.
    fn line(&mut self, line: &str, line_no: usize) {
        if let Some(result) = parse_headline(line, self.kind) {
            match result {
                Ok(headline) => {
                    self.service = Some(headline.service);
                    self.headline_counts = Some(headline.counts);
                    self.coverage = headline.coverage;
                    self.accept(BlockKind::Headline);
                }
                Err(reason) => self.reject(BlockKind::Headline, line_no, reason),
            }
            return;
        }

        if self.kind == OperationKind::Vulns {
            if let Some(result) = parse_severity_totals(line, self.kind.count_fields()) {
                match result {
                    Ok(counts) => {
                        self.severity_totals = Some(counts);
                        self.accept(BlockKind::SeverityTotals);
                    }
                    Err(reason) => self.reject(BlockKind::SeverityTotals, line_no, reason),
                }
                return;
            }
        }

        if let Some((label, result)) = parse_dependency_total(line, self.kind) {
            match result {
                Ok(n) if label == DependencyLabel::Total => {
                    self.total_dependencies = Some(n);
                    self.accept(BlockKind::DependencyTotals);
                }
                Ok(n) => {
                    self.affected_dependencies = Some(n);
                    self.accept(BlockKind::DependencyTotals);
                }
                Err(reason) => self.reject(BlockKind::DependencyTotals, line_no, reason),
            }
        }
    }

    fn module_block(&mut self, body: &[&str], first_line: usize) {
        match parse_modules(body, first_line, self.kind.count_fields()) {
            Ok(modules) => {
                self.modules = Some(modules);
                self.accept(BlockKind::ModuleBreakdown);
            }
            Err((line, reason)) => self.reject(BlockKind::ModuleBreakdown, line, reason),
        }
    }

    fn findings_block(&mut self, body: &[&str]) {
        self.findings = Some(parse_findings(body, self.kind));
        self.accept(BlockKind::TopFindings);
    }

    fn finish(self, text: &str) -> ParseOutcome {
        if self.blocks.is_empty() {
            let reason = if self.rejected.is_empty() {
                UnparsedReason::NoStructuredOutput
            } else {
                UnparsedReason::MalformedBlocks
            };
            return ParseOutcome::Unparsed(UnparsedResult {
                raw: text.to_string(),
                reason,
                rejected: self.rejected,
            });
        }

        let mut mismatches = Vec::new();
        let headline = self.headline_counts.filter(|c| !c.is_empty());
        let reported = match (self.severity_totals, headline) {
            (Some(totals), Some(headline)) => {
                mismatches.extend(compare_counts(&totals, &headline));
                Some(totals)
            }
            (totals, headline) => totals.or(headline),
        };

        let (modules, module_sums) = self.modules.unwrap_or_default();
        let counts = match reported {
            Some(reported) => {
                mismatches.extend(compare_counts(&reported, &module_sums));
                reported
            }
            None => module_sums,
        };

        if let (Some(total), Some(affected)) = (self.total_dependencies, self.affected_dependencies)
        {
            if affected > total {
                mismatches.push(CountMismatch {
                    field: "dependencies".to_string(),
                    reported: total,
                    derived: affected,
                });
            }
        }

        let consistency = if mismatches.is_empty() {
            Consistency::Consistent
        } else {
            Consistency::Inconsistent(mismatches)
        };

        ParseOutcome::Parsed(ParsedSummary {
            kind: self.kind,
            service: self.service,
            counts,
            total_dependencies: self.total_dependencies,
            affected_dependencies: self.affected_dependencies,
            findings: self.findings.unwrap_or_default(),
            modules,
            coverage: self.coverage,
            blocks: self.blocks,
            rejected: self.rejected,
            consistency,
        })
    }
}

/// Fields present in both `reported` and `checked` whose values differ.
fn compare_counts(reported: &Counts, checked: &Counts) -> Vec<CountMismatch> {
    checked
        .iter()
        .filter_map(|(field, derived)| {
            let total = reported.get(field)?;
            (total != derived).then(|| CountMismatch {
                field: field.to_string(),
                reported: total,
                derived,
            })
        })
        .collect()
}

/// `MODULE_BREAKDOWN`, `MODULE_BREAKDOWN:` (any case).
fn is_marker(line: &str, marker: &str) -> bool {
    let line = line.strip_suffix(':').unwrap_or(line).trim_end();
    line.eq_ignore_ascii_case(marker)
}

fn find_marker(lines: &[&str], from: usize, marker: &str) -> Option<usize> {
    (from..lines.len()).find(|&j| is_marker(lines[j].trim(), marker))
}

/// Case-insensitive ASCII prefix strip.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn parse_count(token: &str) -> Result<u64, String> {
    let token = token.trim();
    if token.starts_with('-') {
        return Err(format!("negative count '{}'", token));
    }
    token
        .parse::<u64>()
        .map_err(|_| format!("non-numeric count '{}'", token))
}

fn match_field(label: &str, fields: &[CountField]) -> Option<CountField> {
    let label = label.trim().to_lowercase();
    fields
        .iter()
        .copied()
        .find(|f| label == f.key || label.starts_with(f.stem))
}

/// An accepted headline line.
struct Headline {
    service: String,
    counts: Counts,
    coverage: Option<Coverage>,
}

/// `85%` or `85.4%`, truncated to a whole percent.
fn parse_percent(token: &str) -> Result<u8, String> {
    let token = token.trim();
    let whole = match token.split_once('.') {
        Some((whole, fraction)) if fraction.chars().all(|c| c.is_ascii_digit()) => whole,
        Some(_) => return Err(format!("non-numeric percentage '{}%'", token)),
        None => token,
    };
    let value = parse_count(whole)?;
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| format!("percentage above 100 '{}%'", token))
}

/// `✓ {service}: Analysis complete[ - {n} {label}, ...]`
///
/// Test headlines may also carry `{p}% line coverage` and `{p}% branch coverage`.
/// Returns `None` when the line is not a headline.
fn parse_headline(line: &str, kind: OperationKind) -> Option<Result<Headline, String>> {
    let rest = line.strip_prefix(&CHECK_MARKS[..])?.trim_start();
    let (service, rest) = rest.split_once(':')?;
    let service = service.trim();
    if service.is_empty() || service.contains(char::is_whitespace) {
        return None;
    }
    let tail = strip_prefix_ci(rest.trim_start(), HEADLINE_PHRASE)?.trim_start();

    let mut headline = Headline {
        service: service.to_string(),
        counts: Counts::new(),
        coverage: None,
    };
    let Some(segments) = ["-", "—", "–"].iter().find_map(|d| tail.strip_prefix(*d)) else {
        return Some(Ok(headline));
    };

    for segment in segments.split(',') {
        let segment = segment.trim();
        let segment = segment.strip_prefix("and ").unwrap_or(segment);
        if segment.is_empty() {
            continue;
        }
        let (number, label) = segment
            .split_once(char::is_whitespace)
            .unwrap_or((segment, ""));

        if let Some(percent) = number.strip_suffix('%') {
            if kind != OperationKind::Test {
                continue;
            }
            let label = label.trim().to_lowercase();
            let is_line = label.starts_with("line");
            if !is_line && !label.starts_with("branch") {
                continue;
            }
            let value = match parse_percent(percent) {
                Ok(value) => value,
                Err(reason) => return Some(Err(format!("{} in '{}'", reason, segment))),
            };
            let coverage = headline.coverage.get_or_insert_with(Coverage::default);
            if is_line {
                coverage.line = Some(value);
            } else {
                coverage.branch = Some(value);
            }
            continue;
        }

        let Some(field) = match_field(label, kind.count_fields()) else {
            continue;
        };
        match parse_count(number) {
            Ok(n) => headline.counts.set(field.key, n),
            Err(reason) => return Some(Err(format!("{} in '{}'", reason, segment))),
        }
    }

    Some(Ok(headline))
}

/// `Total: Critical=4, High=71, Medium=67[, Low=19]`
fn parse_severity_totals(line: &str, fields: &[CountField]) -> Option<Result<Counts, String>> {
    let body = strip_prefix_ci(line, "total:")?;
    if !body.contains('=') {
        return None;
    }

    let mut counts = Counts::new();
    for pair in body.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let Some(field) = match_field(key, fields) else {
            continue;
        };
        match parse_count(value) {
            Ok(n) => counts.set(field.key, n),
            Err(reason) => return Some(Err(reason)),
        }
    }

    if counts.is_empty() {
        return None;
    }
    Some(Ok(counts))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependencyLabel {
    Total,
    Affected,
}

/// `Total: {n} dependencies` and `Outdated:`/`Affected: {n} dependencies`.
fn parse_dependency_total(
    line: &str,
    kind: OperationKind,
) -> Option<(DependencyLabel, Result<u64, String>)> {
    let affected_label = kind.affected_label()?;

    let (label, body) = if let Some(body) = strip_prefix_ci(line, "total:") {
        (DependencyLabel::Total, body)
    } else {
        let prefix = format!("{}:", affected_label);
        (DependencyLabel::Affected, strip_prefix_ci(line, &prefix)?)
    };

    let mut tokens = body.split_whitespace();
    let number = tokens.next()?;
    let noun = tokens.next()?.to_lowercase();
    if !noun.starts_with("dependenc") {
        return None;
    }
    Some((label, parse_count(number)))
}

fn is_separator_row(cells: &[&str]) -> bool {
    cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' | ' ')))
}

fn is_header_row(values: &[&str], fields: &[CountField]) -> bool {
    values
        .iter()
        .zip(fields)
        .all(|(v, f)| match_field(v, std::slice::from_ref(f)).is_some())
}

/// Rows of `{module}|{n}|{n}...`, columns mapped to `fields` in order.
///
/// Returns the modules with their column sums. A sum past `u64::MAX` rejects the block.
fn parse_modules(
    body: &[&str],
    first_line: usize,
    fields: &[CountField],
) -> Result<(BTreeMap<String, Counts>, Counts), (usize, String)> {
    let mut modules: BTreeMap<String, Counts> = BTreeMap::new();
    let mut sums = Counts::new();
    let mut seen_row = false;

    for (offset, raw) in body.iter().enumerate() {
        let line_no = first_line + offset;
        let line = raw.trim();
        if !line.contains('|') {
            continue;
        }
        let cells: Vec<&str> = line.trim_matches('|').split('|').map(str::trim).collect();
        if is_separator_row(&cells) {
            continue;
        }

        let (name, values) = cells.split_first().ok_or((line_no, "empty row".to_string()))?;
        if !seen_row && is_header_row(values, fields) && !values.is_empty() {
            seen_row = true;
            continue;
        }
        seen_row = true;

        if name.is_empty() {
            return Err((line_no, "missing module name".to_string()));
        }
        if values.is_empty() || values.len() > fields.len() {
            return Err((
                line_no,
                format!(
                    "expected 1 to {} count columns, found {}",
                    fields.len(),
                    values.len()
                ),
            ));
        }

        let counts = modules.entry(name.to_string()).or_default();
        for (value, field) in values.iter().zip(fields) {
            let n = parse_count(value).map_err(|reason| (line_no, reason))?;
            counts
                .checked_add(field.key, n)
                .ok_or_else(|| (line_no, format!("count overflow in '{}'", field.key)))?;
            sums
                .checked_add(field.key, n)
                .ok_or_else(|| (line_no, format!("count overflow in '{}' total", field.key)))?;
        }
    }

    Ok((modules, sums))
}

/// `1. {identifier}` followed by `Key: value` lines.
fn numbered_entry(line: &str) -> Option<&str> {
    let digits = line.find(|c: char| !c.is_ascii_digit())?;
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix(&['.', ')'][..])?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim();
    (!rest.is_empty()).then_some(rest)
}

fn field_value(value: &str) -> Option<String> {
    let value = value.trim();
    if EMPTY_VALUES.iter().any(|e| value.eq_ignore_ascii_case(e)) {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Default)]
struct UpgradeOffers {
    patch: Option<String>,
    minor: Option<String>,
    major: Option<String>,
    latest: Option<String>,
}

fn parse_findings(body: &[&str], kind: OperationKind) -> Vec<Finding> {
    let mut entries: Vec<(Finding, UpgradeOffers)> = Vec::new();

    for raw in body {
        let line = raw.trim();
        if let Some(rest) = numbered_entry(line) {
            let id = rest
                .split_whitespace()
                .next()
                .unwrap_or(rest)
                .trim_end_matches(&[':', ','][..]);
            entries.push((Finding::new(id), UpgradeOffers::default()));
            continue;
        }

        let Some((finding, offers)) = entries.last_mut() else {
            continue;
        };
        let line = line.trim_start_matches(&['-', '*'][..]).trim_start();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = field_value(value);

        match kind {
            OperationKind::Vulns => {
                if key.starts_with("severity") {
                    finding.category = value.map(|v| v.to_lowercase());
                } else if key.starts_with("package") || key.contains("artifact") {
                    finding.package = value;
                } else if key.starts_with("installed") || key.starts_with("current") {
                    finding.current = value;
                } else if key.starts_with("fix") || key.starts_with("recommend") {
                    finding.recommended = value;
                } else if key.starts_with("module") {
                    finding.module = value;
                }
            }
            _ => {
                if key.starts_with("current") {
                    finding.current = value;
                } else if key.starts_with("patch") {
                    offers.patch = value;
                } else if key.starts_with("minor") {
                    offers.minor = value;
                } else if key.starts_with("major") {
                    offers.major = value;
                } else if key.starts_with("latest") {
                    offers.latest = value;
                } else if key.starts_with("module") {
                    finding.module = value;
                }
            }
        }
    }

    entries
        .into_iter()
        .take(MAX_FINDINGS)
        .map(|(mut finding, offers)| {
            if kind != OperationKind::Vulns {
                let newest = [
                    ("major", offers.major),
                    ("minor", offers.minor),
                    ("patch", offers.patch),
                ]
                .into_iter()
                .find_map(|(level, v)| v.map(|v| (level, v)));
                match newest {
                    Some((level, version)) => {
                        finding.recommended = Some(version);
                        finding.category = Some(level.to_string());
                    }
                    None => finding.recommended = offers.latest,
                }
            }
            finding
        })
        .collect()
}
