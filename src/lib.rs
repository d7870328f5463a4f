// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Broker Defs
//!
//! Diff and deploy message-broker definitions: vhosts, users, exchanges,
//! queues, bindings, permissions and topic permissions.
//!
//! ## Overview
//!
//! A definitions snapshot is the JSON document a broker's management API
//! exports. This crate compares two snapshots, or a snapshot against a live
//! broker, and converges the broker onto the desired one:
//!
//! - Index every record by its natural identity
//! - Classify records as added, deleted, changed or unaffected
//! - Detect bindings dropped by the recreation of a changed exchange or queue
//! - Plan dependency-ordered batches and dispatch them with staggered
//!   concurrency, aborting on the first failed batch
//!
//! ## Architecture
//!
//! 1. **Desired State**: a definitions file
//! 2. **Observed State**: `GET /api/definitions` on the live broker
//! 3. **Deployer**: diffs both, plans phases, executes batches
//!
//! ## Modules
//!
//! - [`definitions`]: Snapshot types, identity index, fingerprints
//! - [`planner`]: Diff engine, deployment plan, batch executor
//! - [`broker`]: Management API transport, endpoints and HTTP client
//! - [`deployer`]: End-to-end deployment runs
//! - [`audit`]: Unused-resource audit against observed usage
//! - [`config`]: Configuration and input file loading
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! # brokerdefs.yaml
//! broker:
//!   url: http://localhost:15672
//!   username: admin
//! deploy:
//!   stagger_ms: 50
//!   ignore:
//!     - vhost: /
//!       queue: scratch
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod audit;
pub mod broker;
pub mod cli;
pub mod config;
pub mod definitions;
pub mod deployer;
pub mod error;
pub mod planner;

// ============================================================================
// Re-exports
// ============================================================================

pub use audit::{AuditReport, UsageAuditor};
pub use broker::{ManagementClient, Transport};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ToolConfig};
pub use definitions::{Definitions, DefinitionsHasher, DefinitionsIndex, ResourceKind};
pub use deployer::{Deployer, DeploymentReport};
pub use error::{BrokerDefsError, Result};
pub use planner::{BatchExecutor, DeployOptions, DeploymentPlan, DiffEngine, DiffResult};
