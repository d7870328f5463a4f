//! Deployment plan types and construction.
//!
//! A plan is an ordered list of batches. Each batch applies one operation to
//! records of one kind; batches run strictly one after another, so the order
//! below is what keeps the broker's references valid:
//!
//! 1. additive: vhosts, users, exchanges, queues
//! 2. mutate: changed vhosts, changed users
//! 3. recreate (opt-in): changed exchanges, queues, bindings, then the
//!    implicitly affected bindings
//! 4. remaining additive: bindings, permissions, topic permissions, changed
//!    permissions and topic permissions
//! 5. deletion (unless disabled), in reverse creation order

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::definitions::{Record, ResourceKind, ResourceSelector};
use crate::error::{ConfigError, Result};

use super::diff::DiffResult;

/// An operation the broker can apply to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Declare a new resource.
    Create,
    /// Overwrite an existing resource in place.
    Update,
    /// Remove a resource.
    Delete,
}

/// Phase a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// New vhosts, users, exchanges and queues.
    Additive,
    /// In-place updates of vhosts and users.
    Mutate,
    /// Delete-and-recreate of changed exchanges, queues and bindings.
    Recreate,
    /// New bindings and grants, updated grants.
    RemainingAdditive,
    /// Deletions in reverse creation order.
    Deletion,
}

/// Policy flags for a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Log mutating calls instead of issuing them.
    pub dry_run: bool,
    /// Skip the deletion phase.
    pub no_deletions: bool,
    /// Delete and recreate changed exchanges, queues and bindings.
    pub recreate_changed: bool,
    /// Resources excluded from diffing.
    pub ignore: Vec<ResourceSelector>,
}

impl DeployOptions {
    /// Checks that the flags can be combined.
    ///
    /// # Errors
    ///
    /// Returns an error if both `no_deletions` and `recreate_changed` are set.
    pub fn validate(&self) -> Result<()> {
        if self.no_deletions && self.recreate_changed {
            return Err(ConfigError::ConflictingOptions {
                first: String::from("no-deletions"),
                second: String::from("recreate-changed"),
            }
            .into());
        }
        Ok(())
    }
}

/// Per-record eligibility filter applied when a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// Skip records scoped to a vhost that is deleted in the same run; the
    /// vhost deletion removes them.
    SkipDeletedVhosts(HashSet<String>),
    /// Skip bindings attached to an exchange or queue recreated earlier in
    /// the same run; the broker dropped them with the old resource.
    SkipRecreatedEndpoints {
        /// Recreated exchanges as `(vhost, name)`.
        exchanges: HashSet<(String, String)>,
        /// Recreated queues as `(vhost, name)`.
        queues: HashSet<(String, String)>,
    },
}

impl RecordFilter {
    /// Returns true if the record should be dispatched.
    #[must_use]
    pub fn allows(&self, record: &Record) -> bool {
        match self {
            Self::SkipDeletedVhosts(vhosts) => field(record, "vhost")
                .is_none_or(|vhost| !vhosts.contains(vhost)),
            Self::SkipRecreatedEndpoints { exchanges, queues } => {
                let vhost = field(record, "vhost").unwrap_or_default();
                let key = |name: &str| (vhost.to_string(), name.to_string());

                let source_recreated =
                    field(record, "source").is_some_and(|source| exchanges.contains(&key(source)));
                let destination_recreated = field(record, "destination").is_some_and(|dest| {
                    match field(record, "destination_type") {
                        Some("exchange") => exchanges.contains(&key(dest)),
                        Some("queue") => queues.contains(&key(dest)),
                        _ => false,
                    }
                });
                !source_recreated && !destination_recreated
            }
        }
    }

    /// Filter for bindings whose endpoints are recreated by this diff.
    fn recreated_endpoints(diff: &DiffResult) -> Self {
        let endpoints = |kind: ResourceKind| -> HashSet<(String, String)> {
            diff.changed
                .get(kind)
                .iter()
                .filter_map(|c| {
                    Some((
                        field(&c.before, "vhost")?.to_string(),
                        field(&c.before, "name")?.to_string(),
                    ))
                })
                .collect()
        };
        Self::SkipRecreatedEndpoints {
            exchanges: endpoints(ResourceKind::Exchange),
            queues: endpoints(ResourceKind::Queue),
        }
    }
}

fn field<'r>(record: &'r Record, name: &str) -> Option<&'r str> {
    record.get(name).and_then(Value::as_str)
}

/// One operation applied to a set of records of one kind.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Phase of the batch.
    pub phase: Phase,
    /// Operation to apply.
    pub operation: Operation,
    /// Kind of every record.
    pub kind: ResourceKind,
    /// Records to apply the operation to.
    pub records: Vec<Record>,
    /// Optional eligibility filter.
    pub filter: Option<RecordFilter>,
}

impl Batch {
    fn new(phase: Phase, operation: Operation, kind: ResourceKind, records: Vec<Record>) -> Self {
        Self {
            phase,
            operation,
            kind,
            records,
            filter: None,
        }
    }

    fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Splits the records into those the filter lets through and the
    /// number it skips.
    #[must_use]
    pub fn eligible(&self) -> (Vec<&Record>, usize) {
        let eligible: Vec<&Record> = self
            .records
            .iter()
            .filter(|record| self.filter.as_ref().is_none_or(|f| f.allows(record)))
            .collect();
        let skipped = self.records.len() - eligible.len();
        (eligible, skipped)
    }

    /// Human-readable label, e.g. "create queues".
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.operation, self.kind.section().replace('_', " "))
    }
}

/// A complete deployment plan.
#[derive(Debug)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the desired definitions.
    pub definitions_hash: String,
    /// Batches in execution order.
    pub batches: Vec<Batch>,
    /// Advisory warnings raised while planning.
    pub warnings: Vec<String>,
    /// Whether the plan is only logged when executed.
    pub dry_run: bool,
}

impl DeploymentPlan {
    /// Creates a plan from a diff of the live broker against the desired
    /// definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the options conflict.
    pub fn from_diff(
        diff: &DiffResult,
        options: &DeployOptions,
        definitions_hash: &str,
    ) -> Result<Self> {
        options.validate()?;

        let mut plan = Self {
            created_at: Utc::now(),
            definitions_hash: definitions_hash.to_string(),
            batches: Vec::new(),
            warnings: preflight_warnings(diff, options),
            dry_run: options.dry_run,
        };

        let changed_after = |kind: ResourceKind| -> Vec<Record> {
            diff.changed.get(kind).iter().map(|c| c.after.clone()).collect()
        };
        let changed_before = |kind: ResourceKind| -> Vec<Record> {
            diff.changed.get(kind).iter().map(|c| c.before.clone()).collect()
        };
        let added = |kind: ResourceKind| diff.added.get(kind).to_vec();
        let deleted = |kind: ResourceKind| diff.deleted.get(kind).to_vec();

        for kind in [
            ResourceKind::Vhost,
            ResourceKind::User,
            ResourceKind::Exchange,
            ResourceKind::Queue,
        ] {
            plan.push(Batch::new(Phase::Additive, Operation::Create, kind, added(kind)));
        }

        for kind in [ResourceKind::Vhost, ResourceKind::User] {
            plan.push(Batch::new(Phase::Mutate, Operation::Update, kind, changed_after(kind)));
        }

        let recreated = options
            .recreate_changed
            .then(|| RecordFilter::recreated_endpoints(diff));

        if let Some(recreated) = &recreated {
            for kind in [ResourceKind::Exchange, ResourceKind::Queue] {
                plan.push(Batch::new(Phase::Recreate, Operation::Delete, kind, changed_before(kind)));
                plan.push(Batch::new(Phase::Recreate, Operation::Create, kind, changed_after(kind)));
            }
            plan.push(
                Batch::new(
                    Phase::Recreate,
                    Operation::Delete,
                    ResourceKind::Binding,
                    changed_before(ResourceKind::Binding),
                )
                .with_filter(recreated.clone()),
            );
            plan.push(Batch::new(
                Phase::Recreate,
                Operation::Create,
                ResourceKind::Binding,
                changed_after(ResourceKind::Binding),
            ));
            plan.push(Batch::new(
                Phase::Recreate,
                Operation::Create,
                ResourceKind::Binding,
                diff.implicitly_affected.bindings.clone(),
            ));
        }

        for kind in [
            ResourceKind::Binding,
            ResourceKind::Permission,
            ResourceKind::TopicPermission,
        ] {
            plan.push(Batch::new(Phase::RemainingAdditive, Operation::Create, kind, added(kind)));
        }
        for kind in [ResourceKind::Permission, ResourceKind::TopicPermission] {
            plan.push(Batch::new(
                Phase::RemainingAdditive,
                Operation::Update,
                kind,
                changed_after(kind),
            ));
        }

        if !options.no_deletions {
            let deleted_vhosts: HashSet<String> = diff
                .deleted
                .vhosts
                .iter()
                .filter_map(|v| v.get("name").and_then(Value::as_str).map(String::from))
                .collect();

            plan.push(Batch::new(
                Phase::Deletion,
                Operation::Delete,
                ResourceKind::TopicPermission,
                deleted(ResourceKind::TopicPermission),
            ));
            for kind in [ResourceKind::Permission, ResourceKind::User] {
                plan.push(
                    Batch::new(Phase::Deletion, Operation::Delete, kind, deleted(kind))
                        .with_filter(RecordFilter::SkipDeletedVhosts(deleted_vhosts.clone())),
                );
            }
            let mut bindings = Batch::new(
                Phase::Deletion,
                Operation::Delete,
                ResourceKind::Binding,
                deleted(ResourceKind::Binding),
            );
            if let Some(recreated) = recreated {
                bindings = bindings.with_filter(recreated);
            }
            plan.push(bindings);
            for kind in [ResourceKind::Queue, ResourceKind::Exchange, ResourceKind::Vhost] {
                plan.push(Batch::new(Phase::Deletion, Operation::Delete, kind, deleted(kind)));
            }
        }

        Ok(plan)
    }

    /// Appends a batch unless it has no records.
    fn push(&mut self, batch: Batch) {
        if !batch.records.is_empty() {
            self.batches.push(batch);
        }
    }

    /// Returns true if the plan has no batch.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total number of records across all batches.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }

    /// Number of records per operation.
    #[must_use]
    pub fn counts_by_operation(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for batch in &self.batches {
            *counts.entry(batch.operation.to_string()).or_insert(0) += batch.records.len();
        }
        counts
    }
}

/// Advisory conditions worth telling the operator about before deploying.
fn preflight_warnings(diff: &DiffResult, options: &DeployOptions) -> Vec<String> {
    let mut warnings = Vec::new();

    let granted_vhosts: HashSet<&str> = diff
        .added
        .permissions
        .iter()
        .filter_map(|p| p.get("vhost").and_then(Value::as_str))
        .collect();
    for vhost in &diff.added.vhosts {
        let name = vhost.get("name").and_then(Value::as_str).unwrap_or_default();
        if !granted_vhosts.contains(name) {
            warnings.push(format!(
                "Vhost '{name}' is added without a permission grant; no user will be able to use it"
            ));
        }
    }

    if !options.recreate_changed {
        let skipped = [
            ResourceKind::Exchange,
            ResourceKind::Queue,
            ResourceKind::Binding,
        ]
        .into_iter()
        .filter(|kind| !diff.changed.get(*kind).is_empty())
        .map(|kind| format!("{} {}", diff.changed.get(kind).len(), kind.section()))
        .collect::<Vec<_>>();
        if !skipped.is_empty() {
            warnings.push(format!(
                "Changed {} will be skipped; use recreate-changed to delete and recreate them",
                skipped.join(", ")
            ));
        }
    }

    if options.no_deletions && diff.deleted_count() > 0 {
        warnings.push(format!(
            "{} deletions skipped because deletions are disabled",
            diff.deleted_count()
        ));
    }

    warnings
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Additive => "additive",
            Self::Mutate => "mutate",
            Self::Recreate => "recreate",
            Self::RemainingAdditive => "remaining additive",
            Self::Deletion => "deletion",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.batches.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(
            f,
            "Deployment Plan ({} batches, {} operations):",
            self.batches.len(),
            self.operation_count()
        )?;
        for (i, batch) in self.batches.iter().enumerate() {
            writeln!(f, "  {i}. [{}] {} ({})", batch.phase, batch.label(), batch.records.len())?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "\nWarnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  - {warning}")?;
            }
        }

        Ok(())
    }
}
