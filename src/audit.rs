//! Usage audit for declared queues and exchanges.
//!
//! Cross-references an index of declared resources against records of
//! observed use and reports, per kind, which declared resources were never
//! seen and whether the unused share exceeds the configured threshold.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::AuditConfig;
use crate::definitions::{DefinitionsIndex, ResourceKind, ResourceSelector};
use crate::error::Result;

/// Auditor comparing declared resources with observed usage.
#[derive(Debug, Clone, Copy)]
pub struct UsageAuditor {
    config: AuditConfig,
}

/// Audit result for one resource kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditFinding {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Number of declared resources.
    pub declared: usize,
    /// Declared resources never observed in use, sorted.
    pub unused: Vec<String>,
    /// `unused / declared`, zero when nothing is declared.
    pub ratio: f64,
    /// Configured threshold.
    pub threshold: f64,
    /// Whether `ratio` is above `threshold`.
    pub exceeds_threshold: bool,
}

/// Audit results for queues and exchanges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    /// Queue findings.
    pub queues: AuditFinding,
    /// Exchange findings.
    pub exchanges: AuditFinding,
}

impl AuditReport {
    /// Findings in display order.
    #[must_use]
    pub fn findings(&self) -> [&AuditFinding; 2] {
        [&self.queues, &self.exchanges]
    }

    /// Human-readable warnings for every finding above its threshold.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.findings()
            .into_iter()
            .filter(|f| f.exceeds_threshold)
            .map(|f| {
                format!(
                    "{} of {} {} are unused ({:.1}%, threshold {:.1}%)",
                    f.unused.len(),
                    f.declared,
                    f.kind.section(),
                    f.ratio * 100.0,
                    f.threshold * 100.0
                )
            })
            .collect()
    }
}

impl UsageAuditor {
    /// Creates an auditor with the given thresholds.
    #[must_use]
    pub const fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    /// Audits `declared` against observed `usage`.
    ///
    /// A usage record naming an exchange and a queue marks both as used.
    ///
    /// # Errors
    ///
    /// Returns an error if the usage records cannot be indexed.
    pub fn audit(
        &self,
        declared: &DefinitionsIndex,
        usage: &[ResourceSelector],
    ) -> Result<AuditReport> {
        let used = DefinitionsIndex::from_selectors(usage)?;

        let report = AuditReport {
            queues: Self::finding(
                declared,
                &used,
                ResourceKind::Queue,
                self.config.queue_threshold,
            ),
            exchanges: Self::finding(
                declared,
                &used,
                ResourceKind::Exchange,
                self.config.exchange_threshold,
            ),
        };

        for finding in report.findings() {
            info!(
                "Audit: {} of {} {} unused",
                finding.unused.len(),
                finding.declared,
                finding.kind.section()
            );
        }
        for warning in report.warnings() {
            warn!("{warning}");
        }

        Ok(report)
    }

    fn finding(
        declared: &DefinitionsIndex,
        used: &DefinitionsIndex,
        kind: ResourceKind,
        threshold: f64,
    ) -> AuditFinding {
        let set = declared.set(kind);
        let mut unused: Vec<String> = set
            .entries()
            .filter(|(identity, _)| !used.contains(identity))
            .map(|(_, record)| kind.describe(record))
            .collect();
        unused.sort_unstable();

        let declared = set.len();
        #[allow(clippy::cast_precision_loss)]
        let ratio = if declared == 0 {
            0.0
        } else {
            unused.len() as f64 / declared as f64
        };

        AuditFinding {
            kind,
            declared,
            unused,
            ratio,
            threshold,
            exceeds_threshold: ratio > threshold,
        }
    }
}
