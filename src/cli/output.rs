//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::audit::AuditReport;
use crate::definitions::{Record, ResourceKind};
use crate::deployer::DeploymentReport;
use crate::planner::{DeploymentPlan, DiffResult, Operation};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Diff entry row for table display.
#[derive(Tabled)]
struct DiffRow {
    #[tabled(rename = "")]
    marker: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Resource")]
    resource: String,
}

/// Plan batch row for table display.
#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Batch")]
    batch: String,
    #[tabled(rename = "Records")]
    records: usize,
    #[tabled(rename = "Resources")]
    resources: String,
}

/// Deployment report row for table display.
#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Batch")]
    batch: String,
    #[tabled(rename = "Succeeded")]
    succeeded: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
}

/// Audit finding row for table display.
#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Declared")]
    declared: usize,
    #[tabled(rename = "Unused")]
    unused: usize,
    #[tabled(rename = "Ratio")]
    ratio: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a diff result for display.
    #[must_use]
    pub fn format_diff(&self, diff: &DiffResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(diff),
            OutputFormat::Text => Self::format_diff_text(diff),
        }
    }

    fn format_diff_text(diff: &DiffResult) -> String {
        if !diff.has_changes() {
            return format!(
                "{} No differences ({} resources unaffected).\n",
                "✓".green(),
                diff.unaffected_count()
            );
        }

        let mut rows = Vec::new();
        for kind in ResourceKind::ALL {
            let mut push = |marker: String, record: &Record| {
                rows.push(DiffRow {
                    marker,
                    kind: kind.to_string(),
                    resource: kind.describe(record),
                });
            };
            for record in diff.added.get(kind) {
                push("+".green().to_string(), record);
            }
            for changed in diff.changed.get(kind) {
                push("~".yellow().to_string(), &changed.after);
            }
            for record in diff.deleted.get(kind) {
                push("-".red().to_string(), record);
            }
        }
        for record in &diff.implicitly_affected.bindings {
            rows.push(DiffRow {
                marker: "!".cyan().to_string(),
                kind: ResourceKind::Binding.to_string(),
                resource: ResourceKind::Binding.describe(record),
            });
        }

        let mut output = String::new();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nDiff: {} changes ({} added, {} changed, {} deleted), {} unaffected",
            diff.total_changes(),
            diff.added_count().to_string().green(),
            diff.changed_count().to_string().yellow(),
            diff.deleted_count().to_string().red(),
            diff.unaffected_count()
        );
        if !diff.implicitly_affected.bindings.is_empty() {
            let _ = writeln!(
                output,
                "{} {} bindings are attached to a changed exchange or queue and are recreated with it",
                "!".cyan(),
                diff.implicitly_affected.bindings.len()
            );
        }

        output
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanJson::from(plan)),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &DeploymentPlan) -> String {
        let mut output = String::new();

        if plan.is_empty() {
            let _ = writeln!(
                output,
                "{} No changes required - broker is up to date.",
                "✓".green()
            );
        } else {
            output.push_str("\nDeployment Plan\n");
            let _ = write!(
                output,
                "   Definitions hash: {}\n\n",
                short_hash(&plan.definitions_hash)
            );

            let rows: Vec<BatchRow> = plan
                .batches
                .iter()
                .enumerate()
                .map(|(i, batch)| BatchRow {
                    index: i + 1,
                    phase: batch.phase.to_string(),
                    batch: Self::format_operation(batch.operation, &batch.label()),
                    records: batch.records.len(),
                    resources: truncate(
                        &batch
                            .records
                            .iter()
                            .map(|r| batch.kind.describe(r))
                            .collect::<Vec<_>>()
                            .join(", "),
                        60,
                    ),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');

            let counts = plan.counts_by_operation();
            let count = |op: Operation| counts.get(&op.to_string()).copied().unwrap_or(0);
            let _ = writeln!(
                output,
                "\nPlan: {} to create, {} to update, {} to delete",
                count(Operation::Create).to_string().green(),
                count(Operation::Update).to_string().yellow(),
                count(Operation::Delete).to_string().red()
            );
        }

        Self::append_warnings(&mut output, &plan.warnings);
        output
    }

    /// Formats a deployment report.
    #[must_use]
    pub fn format_report(&self, report: &DeploymentReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                let mode = if report.dry_run { " (dry run)" } else { "" };
                let mut output = format!("{} Deployment complete{mode}\n", "✓".green());
                let _ = writeln!(output, "   Run: {}", report.run_id);
                let _ = writeln!(
                    output,
                    "   Definitions hash: {}",
                    short_hash(&report.definitions_hash)
                );

                if report.is_noop() {
                    output.push_str("   No changes required.\n");
                } else {
                    let rows: Vec<ReportRow> = report
                        .batches
                        .iter()
                        .map(|b| ReportRow {
                            batch: b.label.clone(),
                            succeeded: b.succeeded,
                            skipped: b.skipped,
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let duration = report.finished_at - report.started_at;
                let _ = writeln!(
                    output,
                    "\n{} requests succeeded in {} ms",
                    report.succeeded(),
                    duration.num_milliseconds()
                );
                Self::append_warnings(&mut output, &report.warnings);
                output
            }
        }
    }

    /// Formats a usage audit report.
    #[must_use]
    pub fn format_audit(&self, report: &AuditReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                let rows: Vec<AuditRow> = report
                    .findings()
                    .into_iter()
                    .map(|f| AuditRow {
                        kind: f.kind.section().to_string(),
                        declared: f.declared,
                        unused: f.unused.len(),
                        ratio: if f.exceeds_threshold {
                            format!("{:.1}%", f.ratio * 100.0).red().to_string()
                        } else {
                            format!("{:.1}%", f.ratio * 100.0)
                        },
                        threshold: format!("{:.1}%", f.threshold * 100.0),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');

                for finding in report.findings() {
                    if finding.unused.is_empty() {
                        continue;
                    }
                    let _ = writeln!(output, "\nUnused {}:", finding.kind.section());
                    for name in &finding.unused {
                        let _ = writeln!(output, "   - {name}");
                    }
                }

                Self::append_warnings(&mut output, &report.warnings());
                output
            }
        }
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "status": "error", "message": message })),
            OutputFormat::Text => format!("{} {message}", "✗".red()),
        }
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                to_json(&serde_json::json!({ "status": "warning", "message": message }))
            }
            OutputFormat::Text => format!("{} {message}", "⚠".yellow()),
        }
    }

    fn append_warnings(output: &mut String, warnings: &[String]) {
        if warnings.is_empty() {
            return;
        }
        let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
        for warning in warnings {
            let _ = writeln!(output, "   - {warning}");
        }
    }

    /// Formats a batch label with its operation's color.
    fn format_operation(operation: Operation, label: &str) -> String {
        match operation {
            Operation::Create => label.green().to_string(),
            Operation::Update => label.yellow().to_string(),
            Operation::Delete => label.red().to_string(),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Truncates a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson {
    definitions_hash: String,
    created_at: String,
    operation_count: usize,
    counts: BTreeMap<String, usize>,
    batches: Vec<BatchJson>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct BatchJson {
    phase: String,
    label: String,
    operation: Operation,
    kind: ResourceKind,
    records: Vec<String>,
}

impl From<&DeploymentPlan> for PlanJson {
    fn from(plan: &DeploymentPlan) -> Self {
        Self {
            definitions_hash: plan.definitions_hash.clone(),
            created_at: plan.created_at.to_rfc3339(),
            operation_count: plan.operation_count(),
            counts: plan.counts_by_operation(),
            batches: plan
                .batches
                .iter()
                .map(|b| BatchJson {
                    phase: b.phase.to_string(),
                    label: b.label(),
                    operation: b.operation,
                    kind: b.kind,
                    records: b.records.iter().map(|r| b.kind.describe(r)).collect(),
                })
                .collect(),
            warnings: plan.warnings.clone(),
        }
    }
}
