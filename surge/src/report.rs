//! Writing finished reports to disk and to the console.
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use surge_core::{Report, Scenario};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
#[allow(unused)]
use tracing::{debug, info, warn};

const RULE_WIDTH: usize = 70;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to format report timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Where a report landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

#[derive(Serialize)]
struct ReportFile<'a> {
    scenario: &'a Scenario,
    results: &'a Report,
    timestamp: &'a str,
}

/// Persists reports as a JSON and a Markdown file pair under one directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `<scenario name>_<timestamp>.json` and `.md`, creating the directory if needed.
    pub fn write(
        &self,
        report: &Report,
        scenario: &Scenario,
        at: OffsetDateTime,
    ) -> Result<ReportPaths, ReportError> {
        std::fs::create_dir_all(&self.dir)?;

        let timestamp = at.format(&Rfc3339)?;
        let name = report_name(&scenario.name, &timestamp);

        let json = self.dir.join(format!("{name}.json"));
        let file = ReportFile {
            scenario,
            results: report,
            timestamp: &timestamp,
        };
        std::fs::write(&json, serde_json::to_string_pretty(&file)?)?;
        info!("JSON report saved: {}", json.display());

        let markdown = self.dir.join(format!("{name}.md"));
        std::fs::write(&markdown, render_markdown(report, scenario, &timestamp))?;
        info!("Markdown report saved: {}", markdown.display());

        Ok(ReportPaths { json, markdown })
    }
}

/// `Light Load` at `2024-05-01T10:00:00.5Z` becomes `Light Load_2024-05-01T10-00-00-5Z`.
pub fn report_name(scenario_name: &str, timestamp: &str) -> String {
    format!("{scenario_name}_{}", timestamp.replace([':', '.'], "-"))
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.
    } else {
        part as f64 / total as f64 * 100.
    }
}

pub fn render_markdown(report: &Report, scenario: &Scenario, date: &str) -> String {
    let mut md = String::new();
    // NOTE: Writing to a String cannot fail.
    let _ = write_markdown(&mut md, report, scenario, date);
    md
}

fn write_markdown(
    md: &mut String,
    report: &Report,
    scenario: &Scenario,
    date: &str,
) -> fmt::Result {
    writeln!(md, "# Webhook Load Test Report\n")?;
    writeln!(md, "**Date**: {date}\n")?;
    writeln!(md, "## Test Scenario: {}\n", scenario.name)?;
    writeln!(md, "- **Merchants**: {}", scenario.entity_count)?;
    writeln!(md, "- **Requests/sec**: {}", scenario.requests_per_second)?;
    writeln!(md, "- **Duration**: {}s", scenario.duration.as_secs())?;
    writeln!(
        md,
        "- **Total Expected Requests**: {}\n",
        scenario.expected_requests()
    )?;

    writeln!(md, "## Results Summary\n")?;
    writeln!(md, "| Metric | Value |")?;
    writeln!(md, "|--------|-------|")?;
    writeln!(md, "| Total Requests Sent | {} |", report.total_requests)?;
    writeln!(
        md,
        "| Successful | {} ({:.2}%) |",
        report.successful, report.success_rate
    )?;
    writeln!(
        md,
        "| Failed | {} ({:.2}%) |",
        report.failed,
        percent(report.failed, report.total_requests)
    )?;
    for (label, value) in [
        ("Avg Response Time", report.avg_response_time),
        ("Min Response Time", report.min_response_time),
        ("Max Response Time", report.max_response_time),
        ("P50 Response Time", report.p50_response_time),
        ("P90 Response Time", report.p90_response_time),
        ("P99 Response Time", report.p99_response_time),
    ] {
        writeln!(md, "| {label} | {value:.2}ms |")?;
    }
    writeln!(md, "| Actual RPS | {:.2} |", report.actual_rps)?;
    writeln!(
        md,
        "| Test Duration | {:.2}s |\n",
        report.actual_duration_seconds
    )?;

    if !report.per_entity_breakdown.is_empty() {
        writeln!(md, "## Per-Merchant Breakdown\n")?;
        writeln!(md, "| Merchant ID | Requests | Success | Failed | Avg Response |")?;
        writeln!(md, "|-------------|----------|---------|--------|--------------|")?;
        for entity in &report.per_entity_breakdown {
            writeln!(
                md,
                "| {} | {} | {} | {} | {:.2}ms |",
                entity.entity_id,
                entity.total,
                entity.success,
                entity.failed,
                entity.avg_response_time
            )?;
        }
        writeln!(md)?;
    }

    let errors = report.error_counts();
    if !errors.is_empty() {
        writeln!(md, "## Error Details\n")?;
        writeln!(md, "| Error | Count |")?;
        writeln!(md, "|-------|-------|")?;
        for (message, count) in errors {
            writeln!(md, "| {message} | {count} |")?;
        }
        writeln!(md)?;
    }

    Ok(())
}

/// Console summary of a finished run.
pub fn render_summary(report: &Report, scenario: &Scenario) -> String {
    let mut out = String::new();
    let _ = write_summary(&mut out, report, scenario);
    out
}

fn write_summary(out: &mut String, report: &Report, scenario: &Scenario) -> fmt::Result {
    let rule = "=".repeat(RULE_WIDTH);

    writeln!(out, "\n{rule}\n  TEST SUMMARY\n{rule}\n")?;
    writeln!(out, "Scenario: {}", scenario.name)?;
    writeln!(
        out,
        "Merchants: {} | RPS: {} | Duration: {}s\n",
        scenario.entity_count,
        scenario.requests_per_second,
        scenario.duration.as_secs()
    )?;
    writeln!(out, "Results:")?;
    writeln!(out, "  Total Requests:  {}", report.total_requests)?;
    writeln!(
        out,
        "  Successful:      {} ({:.2}%)",
        report.successful, report.success_rate
    )?;
    writeln!(out, "  Failed:          {}", report.failed)?;
    writeln!(out, "  Avg Response:    {:.2}ms", report.avg_response_time)?;
    writeln!(out, "  Min Response:    {:.2}ms", report.min_response_time)?;
    writeln!(out, "  Max Response:    {:.2}ms", report.max_response_time)?;
    writeln!(
        out,
        "  p50/p90/p99:     {:.2}ms / {:.2}ms / {:.2}ms",
        report.p50_response_time, report.p90_response_time, report.p99_response_time
    )?;
    writeln!(out, "  Actual RPS:      {:.2}", report.actual_rps)?;
    writeln!(
        out,
        "  Duration:        {:.2}s\n",
        report.actual_duration_seconds
    )?;

    if !report.errors.is_empty() {
        writeln!(
            out,
            "WARNING: {} error(s) occurred. Check the detailed report for more info.\n",
            report.errors.len()
        )?;
    }
    writeln!(out, "{rule}")
}

pub fn print_summary(report: &Report, scenario: &Scenario) {
    println!("{}", render_summary(report, scenario));
}
