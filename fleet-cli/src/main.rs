//! Fleet: coordinated release management across a core repository and its
//! module repositories.
//!
//! # Usage
//!
//! ```text
//! fleet show | fetch [REMOTE..] | clean
//! fleet releases | builds [REL..] | modules-in-build [BUILD]
//! fleet release | build | release-info REL
//! fleet switch [TARGET] | split-release NAME | remove-release NAME | remove-build NAME
//! fleet changes local|remote [REL] | changes cross TARGET BASE
//! fleet deps order PATH.. | deps show MODULE PATH..
//! fleet remote list|show|add|rm|rename|set-urlbase|sync|retrack
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{
    changes::ChangesCommand,
    deps::DepsCommand,
    release::{BuildsArgs, ModulesInBuildArgs, NameArgs, SplitArgs, SwitchArgs},
    remote::RemoteCommand,
    FetchArgs, Session,
};
use fleet_core::FleetError;
use fleet_release::ReleaseError;

/// Exit status for a batch whose commit or rollback failed part-way.
const EXIT_INCONSISTENT: u8 = 3;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "fleet",
    version,
    about = "Manage releases and builds across a fleet of git repositories",
    long_about = None,
)]
struct Cli {
    /// Start fleet discovery here instead of the current directory.
    #[arg(long, short = 'C', global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the fleet root, current build, modules and remotes.
    Show,

    /// Fetch every repository, then recompute tracking branches.
    Fetch(FetchArgs),

    /// List uncommitted changes in every repository.
    Clean,

    /// List every release.
    Releases,

    /// List the builds of the given releases (default: the current one).
    Builds(BuildsArgs),

    /// List the module branches a build binds, inherited ones included.
    ModulesInBuild(ModulesInBuildArgs),

    /// Print the current release.
    Release,

    /// Print the current build.
    Build,

    /// Show a release's parent, branch and builds.
    ReleaseInfo(NameArgs),

    /// Check out every module on the branches of a build.
    Switch(SwitchArgs),

    /// Create a new release branched off the current one.
    SplitRelease(SplitArgs),

    /// Delete a release, its branches and its metadata.
    RemoveRelease(NameArgs),

    /// Delete a build's metadata.
    RemoveBuild(NameArgs),

    /// Report unmerged commits.
    Changes {
        #[command(subcommand)]
        command: ChangesCommand,
    },

    /// Order modules by their declared dependencies.
    Deps {
        #[command(subcommand)]
        command: DepsCommand,
    },

    /// Manage the fleet-wide remote registry.
    Remote {
        #[command(subcommand)]
        command: RemoteCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn run(cli: Cli) -> Result<()> {
    let session = Session::open(cli.root)?;
    match cli.command {
        Commands::Show => commands::show(&session),
        Commands::Fetch(args) => args.run(&session),
        Commands::Clean => commands::clean(&session),
        Commands::Releases => commands::release::list_releases(&session),
        Commands::Builds(args) => args.run(&session),
        Commands::ModulesInBuild(args) => args.run(&session),
        Commands::Release => commands::release::current_release(&session),
        Commands::Build => commands::release::current_build(&session),
        Commands::ReleaseInfo(args) => commands::release::release_info(&session, &args.name),
        Commands::Switch(args) => args.run(&session),
        Commands::SplitRelease(args) => args.run(&session),
        Commands::RemoveRelease(args) => commands::release::remove_release(&session, &args.name),
        Commands::RemoveBuild(args) => commands::release::remove_build(&session, &args.name),
        Commands::Changes { command } => commands::changes::run(&session, command),
        Commands::Deps { command } => commands::deps::run(command),
        Commands::Remote { command } => commands::remote::run(&session, command),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Print `err` and pick the exit status. Inconsistent repositories are only
/// ever handled here.
fn report(err: &anyhow::Error) -> ExitCode {
    if let Some(fatal) = inconsistent(err) {
        if let FleetError::Inconsistent { phase, repos } = fatal {
            tracing::error!(?phase, repos = %repos.join(", "), "repositories left inconsistent");
        }
        eprintln!("{} {err:#}", "fatal:".red().bold());
        eprintln!("Inspect the listed repositories by hand before running fleet again.");
        return ExitCode::from(EXIT_INCONSISTENT);
    }
    eprintln!("{} {err:#}", "error:".red().bold());
    ExitCode::FAILURE
}

fn inconsistent(err: &anyhow::Error) -> Option<&FleetError> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<FleetError>() {
            return e.is_fatal().then_some(e);
        }
        cause
            .downcast_ref::<ReleaseError>()
            .and_then(ReleaseError::inconsistent)
    })
}
