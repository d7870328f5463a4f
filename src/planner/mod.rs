//! Planning module for deployment operations.
//!
//! This module handles the comparison between two definitions snapshots,
//! turning the diff into ordered batches and dispatching them.

mod diff;
mod executor;
mod plan;

pub use diff::{ChangedRecord, DiffEngine, DiffResult, ImplicitlyAffected};
pub use executor::{BatchExecutor, BatchReport, DEFAULT_STAGGER};
pub use plan::{Batch, DeployOptions, DeploymentPlan, Operation, Phase, RecordFilter};
