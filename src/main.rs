//! brokerdefs CLI entrypoint.
//!
//! This is the main entrypoint for the brokerdefs command-line tool.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use broker_defs::audit::UsageAuditor;
use broker_defs::broker::ManagementClient;
use broker_defs::cli::{Cli, Commands, OutputFormatter, PolicyArgs};
use broker_defs::config::{
    ConfigParser, ToolConfig, load_definitions, load_ignore_list, load_usage,
};
use broker_defs::definitions::{DefinitionsIndex, ResourceSelector};
use broker_defs::deployer::Deployer;
use broker_defs::error::Result;
use broker_defs::planner::{DeployOptions, DiffEngine};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    match runtime.block_on(run(cli, &formatter)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", formatter.error(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<()> {
    let config = ConfigParser::new().load(cli.config.as_deref())?;

    match cli.command {
        Commands::Diff {
            before,
            after,
            ignore,
        } => cmd_diff(&before, &after, ignore.as_deref(), formatter),
        Commands::Plan { desired, policy } => {
            cmd_plan(&config, &desired, &policy, formatter).await
        }
        Commands::Deploy {
            desired,
            policy,
            dry_run,
            yes,
        } => cmd_deploy(&config, &desired, &policy, dry_run, yes, formatter).await,
        Commands::Audit {
            definitions,
            usage,
            include_implicit,
        } => cmd_audit(&config, &definitions, &usage, include_implicit, formatter),
    }
}

/// Offline diff of two definitions files.
fn cmd_diff(
    before: &Path,
    after: &Path,
    ignore: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<()> {
    info!("Diffing {} against {}", before.display(), after.display());

    let before = load_definitions(before)?;
    let after = load_definitions(after)?;
    let ignore = load_ignore(ignore)?;

    let diff = DiffEngine::new().diff_definitions(&before, &after, &ignore)?;
    emit(&formatter.format_diff(&diff))
}

/// Show the deployment plan against the live broker.
async fn cmd_plan(
    config: &ToolConfig,
    desired: &Path,
    policy: &PolicyArgs,
    formatter: &OutputFormatter,
) -> Result<()> {
    let desired = load_definitions(desired)?;
    let options = deploy_options(config, policy, false)?;
    let client = create_client(config, false)?;

    let deployer = Deployer::new(&client).with_stagger(config.deploy.stagger());
    let (_, plan) = deployer.plan(&desired, &options).await?;

    emit(&formatter.format_plan(&plan))
}

/// Deploy desired definitions to the live broker.
async fn cmd_deploy(
    config: &ToolConfig,
    desired: &Path,
    policy: &PolicyArgs,
    dry_run: bool,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let desired = load_definitions(desired)?;
    let options = deploy_options(config, policy, dry_run)?;
    let client = create_client(config, dry_run)?;
    let deployer = Deployer::new(&client).with_stagger(config.deploy.stagger());

    let (_, plan) = deployer.plan(&desired, &options).await?;

    // Confirm
    if !auto_approve && !dry_run {
        if plan.is_empty() {
            return emit(&formatter.format_plan(&plan));
        }
        eprintln!("{}", formatter.format_plan(&plan));

        eprint!(
            "Do you want to deploy these changes to {}? [y/N]: ",
            client.base_url()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("{}", formatter.warning("Deployment cancelled."));
            return Ok(());
        }
    }

    let report = deployer.execute(plan).await?;
    emit(&formatter.format_report(&report))
}

/// Audit declared queues and exchanges against observed usage.
fn cmd_audit(
    config: &ToolConfig,
    definitions: &Path,
    usage: &Path,
    include_implicit: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let definitions = load_definitions(definitions)?;
    let usage = load_usage(usage)?;

    let index = DefinitionsIndex::build(&definitions, include_implicit, None)?;
    let report = UsageAuditor::new(config.audit).audit(&index, &usage)?;

    emit(&formatter.format_audit(&report))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end())?;
    stdout.flush()?;
    Ok(())
}

/// Loads an optional ignore list.
fn load_ignore(path: Option<&Path>) -> Result<Vec<ResourceSelector>> {
    path.map_or_else(|| Ok(Vec::new()), load_ignore_list)
}

/// Merges configured deployment settings with CLI flags.
fn deploy_options(
    config: &ToolConfig,
    policy: &PolicyArgs,
    dry_run: bool,
) -> Result<DeployOptions> {
    let mut options = config.deploy.to_options(load_ignore(policy.ignore.as_deref())?);
    options.dry_run = dry_run;
    options.no_deletions |= policy.no_deletions;
    options.recreate_changed |= policy.recreate_changed;
    options.validate()?;

    debug!(
        "Deploy options: dry_run={}, no_deletions={}, recreate_changed={}, {} ignore selectors",
        options.dry_run,
        options.no_deletions,
        options.recreate_changed,
        options.ignore.len()
    );
    Ok(options)
}

/// Creates a management API client.
fn create_client(config: &ToolConfig, dry_run: bool) -> Result<ManagementClient> {
    info!("Using broker at {}", config.broker.url);
    Ok(ManagementClient::new(&config.broker)?.with_dry_run(dry_run))
}
