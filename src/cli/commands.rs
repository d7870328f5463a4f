//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// brokerdefs - Diff and deploy message-broker definitions.
#[derive(Parser, Debug)]
#[command(name = "brokerdefs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "BROKERDEFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare two definitions files offline.
    Diff {
        /// Definitions before the change.
        before: PathBuf,

        /// Definitions after the change.
        after: PathBuf,

        /// JSON file listing resources to ignore.
        #[arg(long)]
        ignore: Option<PathBuf>,
    },

    /// Diff the live broker against desired definitions and show the plan.
    Plan {
        /// Desired definitions.
        desired: PathBuf,

        /// Plan policy flags.
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Deploy desired definitions to the live broker.
    Deploy {
        /// Desired definitions.
        desired: PathBuf,

        /// Deployment policy flags.
        #[command(flatten)]
        policy: PolicyArgs,

        /// Log mutating requests instead of sending them.
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Report declared queues and exchanges never observed in use.
    Audit {
        /// Declared definitions.
        definitions: PathBuf,

        /// JSON file of observed usage records.
        usage: PathBuf,

        /// Count the broker's predeclared exchanges too.
        #[arg(long)]
        include_implicit: bool,
    },
}

/// Policy flags shared by `plan` and `deploy`.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// JSON file listing resources to ignore.
    #[arg(long)]
    pub ignore: Option<PathBuf>,

    /// Skip the deletion phase.
    #[arg(long, conflicts_with = "recreate_changed")]
    pub no_deletions: bool,

    /// Delete and recreate changed exchanges, queues and bindings.
    #[arg(long)]
    pub recreate_changed: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
