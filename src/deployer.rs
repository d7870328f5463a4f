//! Deployer converging a live broker onto desired definitions.
//!
//! A run fetches the broker's current definitions, diffs them against the
//! desired snapshot, turns the diff into a phased plan and executes it
//! batch by batch. The first failing batch aborts the run; phases already
//! applied stay applied and re-running the deployment is expected to
//! converge.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::broker::{Transport, fetch_definitions};
use crate::definitions::{Definitions, DefinitionsHasher};
use crate::error::{BrokerDefsError, Result};
use crate::planner::{
    BatchExecutor, BatchReport, DEFAULT_STAGGER, DeployOptions, DeploymentPlan, DiffEngine,
    DiffResult,
};

/// Deployer for broker definitions.
pub struct Deployer<'a, T: Transport + ?Sized> {
    /// Transport to the target broker.
    transport: &'a T,
    /// Per-item delay step within a batch.
    stagger: Duration,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Definitions hasher.
    hasher: DefinitionsHasher,
}

/// Result of a deployment run.
#[derive(Debug, Serialize)]
pub struct DeploymentReport {
    /// Identifier of the run, also attached to its log span.
    pub run_id: Uuid,
    /// Fingerprint of the desired definitions.
    pub definitions_hash: String,
    /// Whether mutating calls were suppressed.
    pub dry_run: bool,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Advisory warnings raised while planning.
    pub warnings: Vec<String>,
    /// Per-batch outcomes in execution order.
    pub batches: Vec<BatchReport>,
}

impl DeploymentReport {
    /// Total successful requests.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.batches.iter().map(|b| b.succeeded).sum()
    }

    /// Total records left out by batch filters.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.batches.iter().map(|b| b.skipped).sum()
    }

    /// Returns true if nothing had to be applied.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.batches.is_empty()
    }
}

impl<'a, T: Transport + ?Sized> Deployer<'a, T> {
    /// Creates a new deployer.
    #[must_use]
    pub const fn new(transport: &'a T) -> Self {
        Self {
            transport,
            stagger: DEFAULT_STAGGER,
            diff_engine: DiffEngine::new(),
            hasher: DefinitionsHasher::new(),
        }
    }

    /// Sets the per-item delay step within a batch.
    #[must_use]
    pub const fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Diffs the live broker against `desired` and builds the plan without
    /// executing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the options conflict, the live definitions cannot
    /// be fetched, or either snapshot cannot be indexed.
    pub async fn plan(
        &self,
        desired: &Definitions,
        options: &DeployOptions,
    ) -> Result<(DiffResult, DeploymentPlan)> {
        options.validate()?;

        let live = fetch_definitions(self.transport).await?;
        debug!("Fetched {} live resources", live.total());

        let diff = self
            .diff_engine
            .diff_definitions(&live, desired, &options.ignore)?;
        info!(
            "Diff: {} added, {} deleted, {} changed, {} unaffected, {} implicitly affected bindings",
            diff.added_count(),
            diff.deleted_count(),
            diff.changed_count(),
            diff.unaffected_count(),
            diff.implicitly_affected.bindings.len()
        );

        let plan = DeploymentPlan::from_diff(&diff, options, &self.hasher.hash(desired))?;
        Ok((diff, plan))
    }

    /// Deploys `desired` to the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails or any batch fails; in the latter
    /// case earlier batches remain applied.
    pub async fn deploy(
        &self,
        desired: &Definitions,
        options: &DeployOptions,
    ) -> Result<DeploymentReport> {
        let (_, plan) = self.plan(desired, options).await?;
        self.execute(plan).await
    }

    /// Executes a plan built earlier by [`Deployer::plan`] without
    /// re-reading the broker.
    ///
    /// The plan's dry-run flag is honored whatever mode the transport is in.
    ///
    /// # Errors
    ///
    /// Returns an error if any batch fails; earlier batches remain applied.
    pub async fn execute(&self, plan: DeploymentPlan) -> Result<DeploymentReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("deploy", run_id = %run_id);

        async {
            let started_at = Utc::now();
            let dry_run = plan.dry_run || self.transport.is_dry_run();
            info!(
                "Starting deployment{}",
                if dry_run { " (dry run)" } else { "" }
            );

            for warning in &plan.warnings {
                warn!("{warning}");
            }
            if plan.is_empty() {
                info!("No changes required - broker is converged");
            }

            let batches = BatchExecutor::new(self.transport)
                .with_stagger(self.stagger)
                .with_dry_run(plan.dry_run)
                .execute_plan(&plan)
                .await?;

            let report = DeploymentReport {
                run_id,
                definitions_hash: plan.definitions_hash,
                dry_run,
                started_at,
                finished_at: Utc::now(),
                warnings: plan.warnings,
                batches,
            };
            info!(
                "Deployment finished: {} requests succeeded, {} skipped",
                report.succeeded(),
                report.skipped()
            );
            Ok::<_, BrokerDefsError>(report)
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "Deployment {}{mode}:", self.run_id)?;
        if self.batches.is_empty() {
            writeln!(f, "  No changes required")?;
        }
        for batch in &self.batches {
            writeln!(
                f,
                "  {}: {} succeeded, {} skipped",
                batch.label, batch.succeeded, batch.skipped
            )?;
        }
        if !self.warnings.is_empty() {
            writeln!(f, "  Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "    - {warning}")?;
            }
        }
        Ok(())
    }
}
