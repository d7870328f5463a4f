//! CLI module for the broker definitions tool.
//!
//! This module provides the command-line interface for diffing, planning,
//! deploying and auditing broker definitions.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, PolicyArgs};
pub use output::OutputFormatter;
