//! `fleet remote`: the fleet-wide remote registry.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use fleet_batch::remotes::{self, validate_remote};
use fleet_batch::{retrack, BatchReport};
use fleet_core::Repository;

use super::Session;

#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    /// List remotes, highest priority first.
    List,
    /// Show one remote and its URL in every repository.
    Show(RemoteName),
    /// Add a remote to every repository.
    Add(AddArgs),
    /// Remove a remote from every repository.
    Rm(RemoteName),
    /// Rename a remote in every repository.
    Rename { from: String, to: String },
    /// Point a remote at a new URL base.
    SetUrlbase { name: String, urlbase: String },
    /// Add missing remotes and fix stale URLs where the new URL answers.
    Sync,
    /// Recompute which remote each release branch tracks.
    Retrack,
}

#[derive(Args, Debug)]
pub struct RemoteName {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// URL base; each repository's URL is `<urlbase>/<repository>`.
    pub urlbase: String,

    /// Remote name (default: last path segment of the URL).
    #[arg(long, short)]
    pub name: Option<String>,

    /// 1 (preferred) to 100 (default: from fleet.yaml).
    #[arg(long, short)]
    pub priority: Option<u32>,
}

#[derive(Tabled)]
struct RemoteRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "priority")]
    priority: u32,
    #[tabled(rename = "urlbase")]
    urlbase: String,
}

pub fn run(session: &Session, command: RemoteCommand) -> Result<()> {
    let mut fleet = session.fleet()?;
    let orch = session.orchestrator(&fleet);

    match command {
        RemoteCommand::List => {
            let rows: Vec<RemoteRow> = fleet
                .sorted_remotes()
                .into_iter()
                .map(|r| RemoteRow {
                    name: r.name,
                    priority: r.priority,
                    urlbase: r.urlbase,
                })
                .collect();
            if rows.is_empty() {
                println!("No remotes configured.");
                println!("Run: fleet remote add <urlbase>");
                return Ok(());
            }
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        RemoteCommand::Show(args) => {
            let remote = fleet.remote(&args.name)?;
            println!("{}", remote.to_string().bold());
            for (name, repo) in fleet.all_repos() {
                let actual = repo.remotes().ok().and_then(|r| r.get(&remote.name).cloned());
                let expected = remote.url_for(&name);
                match actual {
                    Some(url) if url == expected => println!("  {} {name}", "✓".green()),
                    Some(url) => println!("  {} {name}: {url} (expected {expected})", "~".yellow()),
                    None => println!("  {} {name}: missing", "✗".red()),
                }
            }
        }
        RemoteCommand::Add(args) => {
            let priority = args.priority.unwrap_or(fleet.settings.default_priority);
            let remote = validate_remote(args.name.as_deref(), &args.urlbase, priority)?;
            let name = remote.name.clone();
            let report = session
                .block_on(remotes::add_remote(&mut fleet, &orch, remote))
                .with_context(|| format!("could not add remote {name}"))?;
            done(&report, &format!("added remote {name}"));
        }
        RemoteCommand::Rm(args) => {
            let report = session
                .block_on(remotes::remove_remote(&mut fleet, &orch, &args.name))
                .with_context(|| format!("could not remove remote {}", args.name))?;
            done(&report, &format!("removed remote {}", args.name));
        }
        RemoteCommand::Rename { from, to } => {
            let report = session
                .block_on(remotes::rename_remote(&mut fleet, &orch, &from, &to))
                .with_context(|| format!("could not rename remote {from}"))?;
            done(&report, &format!("renamed remote {from} to {to}"));
        }
        RemoteCommand::SetUrlbase { name, urlbase } => {
            let report = session
                .block_on(remotes::set_urlbase(&mut fleet, &orch, &name, &urlbase))
                .with_context(|| format!("could not change the URL of remote {name}"))?;
            done(&report, &format!("remote {name} now at {urlbase}"));
        }
        RemoteCommand::Sync => {
            let report = session
                .block_on(remotes::sync_remotes(&fleet, &orch))
                .context("remote sync failed")?
                .into_result()?;
            for r in &report.results {
                for change in &r.results {
                    println!("  {} {}: {change}", "✎".cyan(), r.name);
                }
            }
            println!("{} remotes in sync", "✓".green());
        }
        RemoteCommand::Retrack => {
            let hierarchy =
                fleet_release::load(&fleet).context("failed to load release metadata")?;
            let report = session
                .block_on(retrack(&fleet, &orch, &hierarchy.module_branches()))
                .context("tracking branch update failed")?
                .into_result()?;
            for r in &report.results {
                for t in &r.results {
                    println!("  {} {} now tracks {}", r.name, t.branch, t.remote);
                }
            }
        }
    }
    Ok(())
}

fn done<T>(report: &BatchReport<T>, message: &str) {
    println!("{} {message} ({} repositories)", "✓".green(), report.results.len());
}
