//! Batch executor for applying deployment plans.
//!
//! Batches run one after another. Inside a batch every request is dispatched
//! concurrently, each delayed by its index times the stagger step, and all
//! results are collected before the batch completes. A batch with any failure
//! aborts the plan with the first failure's cause; nothing is rolled back.

use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::broker::{Transport, resolve};
use crate::definitions::ResourceKind;
use crate::error::{BrokerDefsError, DeployError, Result};

use super::plan::{Batch, DeploymentPlan, Operation, Phase};

/// Default per-item delay step.
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(50);

/// Executor dispatching plan batches through a transport.
#[derive(Debug)]
pub struct BatchExecutor<'a, T: Transport + ?Sized> {
    /// Transport requests are sent through.
    transport: &'a T,
    /// Delay added per item index within a batch.
    stagger: Duration,
    /// Log requests instead of dispatching them.
    dry_run: bool,
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Batch label, e.g. "create queues".
    pub label: String,
    /// Phase of the batch.
    pub phase: Phase,
    /// Operation applied.
    pub operation: Operation,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Requests that succeeded.
    pub succeeded: usize,
    /// Requests that failed.
    pub failed: usize,
    /// Records the batch filter left out.
    pub skipped: usize,
    /// One line per failed request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl BatchReport {
    /// Number of requests dispatched.
    #[must_use]
    pub const fn dispatched(&self) -> usize {
        self.succeeded + self.failed
    }
}

impl<'a, T: Transport + ?Sized> BatchExecutor<'a, T> {
    /// Creates a new executor with the default stagger.
    #[must_use]
    pub const fn new(transport: &'a T) -> Self {
        Self {
            transport,
            stagger: DEFAULT_STAGGER,
            dry_run: false,
        }
    }

    /// Sets the per-item delay step.
    #[must_use]
    pub const fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Logs resolved requests instead of sending them.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Executes every batch of a plan in order.
    ///
    /// # Errors
    ///
    /// Returns the first failing batch's error; later batches are not run.
    pub async fn execute_plan(&self, plan: &DeploymentPlan) -> Result<Vec<BatchReport>> {
        info!(
            "Executing deployment plan with {} batches ({} operations)",
            plan.batches.len(),
            plan.operation_count()
        );

        let mut reports = Vec::with_capacity(plan.batches.len());
        for batch in &plan.batches {
            reports.push(self.execute_batch(batch).await?);
        }
        Ok(reports)
    }

    /// Executes one batch.
    ///
    /// Every request is resolved before any is dispatched, so an unsupported
    /// operation fails the batch without remote calls.
    ///
    /// # Errors
    ///
    /// Returns an error if a request cannot be resolved, or
    /// [`DeployError::BatchFailed`] if at least one request failed.
    pub async fn execute_batch(&self, batch: &Batch) -> Result<BatchReport> {
        let label = batch.label();
        let (eligible, skipped) = batch.eligible();

        let mut report = BatchReport {
            label: label.clone(),
            phase: batch.phase,
            operation: batch.operation,
            kind: batch.kind,
            succeeded: 0,
            failed: 0,
            skipped,
            failures: Vec::new(),
        };

        if eligible.is_empty() {
            debug!("Batch '{label}' has no eligible records ({skipped} skipped)");
            return Ok(report);
        }

        let requests = eligible
            .iter()
            .map(|record| resolve(batch.operation, batch.kind, record))
            .collect::<Result<Vec<_>>>()?;

        if self.dry_run {
            for request in &requests {
                match &request.body {
                    Some(body) => info!("[dry-run] {} {} {body}", request.method, request.path),
                    None => info!("[dry-run] {} {}", request.method, request.path),
                }
            }
            report.succeeded = requests.len();
            return Ok(report);
        }

        info!("Executing batch: {label} ({} requests)", requests.len());

        let calls = requests.into_iter().enumerate().map(|(i, request)| async move {
            let delay = self
                .stagger
                .saturating_mul(u32::try_from(i).unwrap_or(u32::MAX));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.transport
                .request(request.method, &request.path, request.body)
                .await
        });
        let results = join_all(calls).await;

        let mut first_failure: Option<BrokerDefsError> = None;
        for (record, result) in eligible.iter().zip(results) {
            match result {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    let description = batch.kind.describe(record);
                    error!("Failed to {} {}: {e}", batch.operation, description);
                    report.failures.push(format!("{description}: {e}"));
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        info!(
            "Batch '{label}': {} succeeded, {} failed, {} skipped",
            report.succeeded, report.failed, report.skipped
        );

        match first_failure {
            Some(source) => Err(DeployError::BatchFailed {
                batch: label,
                failed: report.failed,
                total: report.dispatched(),
                source: Box::new(source),
            }
            .into()),
            None => Ok(report),
        }
    }
}
