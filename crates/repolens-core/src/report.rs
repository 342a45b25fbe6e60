use std::{collections::BTreeMap, fmt::Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::{Finding, Severity};
use crate::metadata::RepositorySummary;

/// Everything one `analyze` run learned about a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Remote locator the run was started with.
    pub repository: String,
    /// Findings in enumeration order.
    pub findings: Vec<Finding>,
    /// Top-level README contents; empty when the repository has none.
    pub readme_text: String,
    /// Raw issue records in the tracker's response order.
    pub open_issues: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RepositorySummary>,
}

impl AnalysisReport {
    /// Number of findings per severity, omitting severities with no findings.
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.severity).or_insert(0) += 1;
        }
        counts
    }
}

/// Merge dispatch output with the metadata side channel. Order is kept verbatim.
pub fn assemble(
    repository: impl Into<String>,
    findings: Vec<Finding>,
    readme_text: String,
    open_issues: Vec<Value>,
    summary: Option<RepositorySummary>,
) -> AnalysisReport {
    AnalysisReport {
        repository: repository.into(),
        findings,
        readme_text,
        open_issues,
        summary,
    }
}

/// Format styles supported by [`render_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Produce a report string from an `AnalysisReport` using the desired format.
pub fn render_report(report: &AnalysisReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonReport::from(report))?),
    }
}

fn render_human(report: &AnalysisReport) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Repository: {}", report.repository)?;
    if let Some(summary) = &report.summary {
        write_summary(&mut out, summary)?;
    }
    writeln!(out)?;

    if report.findings.is_empty() {
        writeln!(out, "No findings.")?;
    } else {
        let counts = report
            .severity_counts()
            .iter()
            .map(|(severity, count)| format!("{} {count}", severity.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "Findings: {} ({counts})", report.findings.len())?;
        for finding in &report.findings {
            write_finding(&mut out, finding)?;
        }
    }

    writeln!(out)?;
    if report.open_issues.is_empty() {
        writeln!(out, "Open Issues: none")?;
    } else {
        writeln!(out, "Open Issues: {}", report.open_issues.len())?;
        for issue in &report.open_issues {
            writeln!(out, "  - {}", issue_line(issue))?;
        }
    }

    writeln!(out)?;
    if report.readme_text.trim().is_empty() {
        writeln!(out, "README: not found")?;
    } else {
        writeln!(
            out,
            "README: {} lines, {} chars",
            report.readme_text.lines().count(),
            report.readme_text.chars().count()
        )?;
    }
    Ok(out)
}

fn write_summary(out: &mut String, summary: &RepositorySummary) -> std::fmt::Result {
    let language = summary.language.as_deref().unwrap_or("unknown language");
    writeln!(
        out,
        "Summary: {} ({language}), {} stars, {} forks, {} open issues",
        summary.full_name, summary.stargazers_count, summary.forks_count, summary.open_issues_count
    )?;
    if let Some(description) = summary.description.as_deref().filter(|d| !d.is_empty()) {
        writeln!(out, "  {description}")?;
    }
    Ok(())
}

fn write_finding(out: &mut String, finding: &Finding) -> std::fmt::Result {
    let mut location = finding.source_file.clone().unwrap_or_else(|| "-".into());
    if let Some(line) = finding.line {
        let _ = write!(location, ":{line}");
    }
    let rule = finding
        .rule
        .as_deref()
        .map(|rule| format!(" {rule}"))
        .unwrap_or_default();
    let mut lines = finding.message.lines();
    let first = lines.next().unwrap_or_default();
    writeln!(
        out,
        "  - {location} [{severity}] {tool}{rule}: {first}",
        severity = finding.severity.as_str(),
        tool = finding.tool,
    )?;
    for line in lines {
        writeln!(out, "      {line}")?;
    }
    Ok(())
}

fn issue_line(issue: &Value) -> String {
    let title = issue
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("(untitled)");
    match issue.get("number").and_then(Value::as_u64) {
        Some(number) => format!("#{number} {title}"),
        None => title.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a AnalysisReport,
    severity_counts: BTreeMap<Severity, usize>,
}

impl<'a> From<&'a AnalysisReport> for JsonReport<'a> {
    fn from(report: &'a AnalysisReport) -> Self {
        Self {
            report,
            severity_counts: report.severity_counts(),
        }
    }
}
