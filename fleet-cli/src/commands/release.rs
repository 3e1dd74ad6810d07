//! Release and build commands: listings, `switch`, `split-release`, removal.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use fleet_core::Fleet;
use fleet_release::{self as release, Hierarchy};

use super::{ensure_clean, Session};

#[derive(Args, Debug)]
pub struct NameArgs {
    pub name: String,
}

fn load(fleet: &Fleet) -> Result<Hierarchy> {
    release::load(fleet).context("failed to load release metadata")
}

fn current_release_name(fleet: &Fleet) -> Result<String> {
    fleet
        .current_release_name()?
        .context("no current release recorded; run `fleet switch <release>` first")
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

pub fn list_releases(session: &Session) -> Result<()> {
    let fleet = session.fleet()?;
    let hierarchy = load(&fleet)?;
    let current = fleet.current_release_name()?;
    for name in hierarchy.releases.keys() {
        if current.as_deref() == Some(name.as_str()) {
            println!("* {}", name.green().bold());
        } else {
            println!("  {name}");
        }
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct BuildsArgs {
    /// Releases to list (default: the current release).
    pub releases: Vec<String>,
}

impl BuildsArgs {
    pub fn run(self, session: &Session) -> Result<()> {
        let fleet = session.fleet()?;
        let hierarchy = load(&fleet)?;
        let releases = if self.releases.is_empty() {
            vec![current_release_name(&fleet)?]
        } else {
            self.releases
        };
        for name in &releases {
            for build in hierarchy.release(name)?.builds.values() {
                println!("{}", build.full_name());
            }
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct BindingRow {
    #[tabled(rename = "module")]
    module: String,
    #[tabled(rename = "branch")]
    branch: String,
}

#[derive(Args, Debug)]
pub struct ModulesInBuildArgs {
    /// Full `release/build` name (default: the current build).
    pub build: Option<String>,
}

impl ModulesInBuildArgs {
    pub fn run(self, session: &Session) -> Result<()> {
        let fleet = session.fleet()?;
        let hierarchy = load(&fleet)?;
        let name = match self.build {
            Some(name) => name,
            None => fleet
                .current_build_name()?
                .context("no current build recorded")?,
        };
        let build = hierarchy.build(&name)?;
        let rows: Vec<BindingRow> = hierarchy
            .build_modules(build)?
            .into_iter()
            .map(|(module, branch)| BindingRow { module, branch })
            .collect();
        if rows.is_empty() {
            println!("Build {name} binds no modules.");
            return Ok(());
        }
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

pub fn current_release(session: &Session) -> Result<()> {
    let fleet = session.fleet()?;
    println!("{}", current_release_name(&fleet)?);
    Ok(())
}

pub fn current_build(session: &Session) -> Result<()> {
    let fleet = session.fleet()?;
    let build = fleet
        .current_build_name()?
        .context("no current build recorded")?;
    println!("{build}");
    Ok(())
}

pub fn release_info(session: &Session, name: &str) -> Result<()> {
    let fleet = session.fleet()?;
    let hierarchy = load(&fleet)?;
    let rel = hierarchy.release(name)?;
    println!("{}", rel.name.bold());
    println!("  parent: {}", rel.parent.as_deref().unwrap_or("(none)"));
    println!("  branch: {}", rel.branch()?);
    let builds: Vec<&str> = rel.builds.keys().map(String::as_str).collect();
    println!("  builds: {}", builds.join(", "));
    let children: Vec<&str> = hierarchy
        .child_releases(name)
        .into_iter()
        .map(|r| r.name.as_str())
        .collect();
    if !children.is_empty() {
        println!("  children: {}", children.join(", "));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// fleet switch
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct SwitchArgs {
    /// A release name or a full `release/build` name (default: the current build).
    pub target: Option<String>,
}

impl SwitchArgs {
    pub fn run(self, session: &Session) -> Result<()> {
        let fleet = session.fleet()?;
        let orch = session.orchestrator(&fleet);
        let dirty = ensure_clean(session, &fleet, &orch)?;
        if dirty > 0 {
            bail!("{dirty} repositories have uncommitted changes; commit or stash them before switching");
        }

        let hierarchy = load(&fleet)?;
        let target = release::switch_target(&fleet, &hierarchy, self.target.as_deref())?;
        let report = session
            .block_on(release::switch_build(&fleet, &orch, &hierarchy, &target))
            .with_context(|| format!("switch to {target} failed"))?;
        for r in &report.results {
            if let Some(previous) = &r.results {
                println!("  {} {} (was {previous})", "✎".cyan(), r.name);
            }
        }
        println!("{} switched to {}", "✓".green(), target.bold());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// fleet split-release / remove-release / remove-build
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Name of the new release, e.g. `pebbles` or `feature/ipv6`.
    pub name: String,

    /// Release to branch from (default: the current release).
    #[arg(long)]
    pub from: Option<String>,
}

impl SplitArgs {
    pub fn run(self, session: &Session) -> Result<()> {
        let fleet = session.fleet()?;
        let orch = session.orchestrator(&fleet);
        let hierarchy = load(&fleet)?;
        let from = match self.from {
            Some(from) => from,
            None => current_release_name(&fleet)?,
        };
        let created = session
            .block_on(release::split_release(&fleet, &orch, &hierarchy, &from, &self.name))
            .with_context(|| format!("could not split {} from {from}", self.name))?;
        println!(
            "{} created release {} from {from} on branch {}",
            "✓".green(),
            created.name.bold(),
            created.branch()?
        );
        Ok(())
    }
}

pub fn remove_release(session: &Session, name: &str) -> Result<()> {
    let fleet = session.fleet()?;
    let hierarchy = load(&fleet)?;
    release::remove_release(&fleet, &hierarchy, name)
        .with_context(|| format!("could not remove release {name}"))?;
    println!("{} removed release {name}", "✓".green());
    Ok(())
}

pub fn remove_build(session: &Session, name: &str) -> Result<()> {
    let fleet = session.fleet()?;
    let hierarchy = load(&fleet)?;
    let full = if name.contains('/') {
        name.to_string()
    } else {
        format!("{}/{name}", current_release_name(&fleet)?)
    };
    release::remove_build(&fleet, &hierarchy, &full)
        .with_context(|| format!("could not remove build {full}"))?;
    println!("{} removed build {full}", "✓".green());
    Ok(())
}
