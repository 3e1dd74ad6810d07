//! `fleet changes`: unmerged commits between branches.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use fleet_release::{cross_release_changes, local_changes, remote_changes, ChangeSet};

use super::Session;

#[derive(Subcommand, Debug)]
pub enum ChangesCommand {
    /// Local commits not yet pushed upstream.
    Local(ReleaseArg),
    /// Upstream commits not yet merged locally.
    Remote(ReleaseArg),
    /// Commits in TARGET that BASE does not have.
    Cross {
        target: String,
        base: String,
    },
}

#[derive(Args, Debug)]
pub struct ReleaseArg {
    /// Release to inspect (default: the current release).
    pub release: Option<String>,
}

pub fn run(session: &Session, command: ChangesCommand) -> Result<()> {
    let fleet = session.fleet()?;
    let hierarchy = fleet_release::load(&fleet).context("failed to load release metadata")?;

    let pick = |arg: ReleaseArg| -> Result<String> {
        match arg.release {
            Some(name) => Ok(name),
            None => fleet
                .current_release_name()?
                .context("no current release recorded"),
        }
    };

    let changes = match command {
        ChangesCommand::Local(arg) => local_changes(&fleet, &hierarchy, &pick(arg)?)?,
        ChangesCommand::Remote(arg) => remote_changes(&fleet, &hierarchy, &pick(arg)?)?,
        ChangesCommand::Cross { target, base } => {
            cross_release_changes(&fleet, &hierarchy, &target, &base)?
        }
    };
    print_changes(&changes);
    Ok(())
}

fn print_changes(changes: &[ChangeSet]) {
    if changes.is_empty() {
        println!("No unmerged changes.");
        return;
    }
    for set in changes {
        println!(
            "{} ({} commits in {} not in {})",
            set.repo.bold(),
            set.commits.len(),
            set.head,
            set.base
        );
        for commit in &set.commits {
            println!("  {commit}");
        }
    }
}
