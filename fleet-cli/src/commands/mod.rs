pub mod changes;
pub mod deps;
pub mod release;
pub mod remote;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use fleet_batch::{check_clean, fetch_all, retrack, BatchReport, Orchestrator};
use fleet_core::{Fleet, Repository};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Per-invocation state: where discovery starts and the runtime batches run on.
pub struct Session {
    start: PathBuf,
    runtime: tokio::runtime::Runtime,
}

impl Session {
    pub fn open(root: Option<PathBuf>) -> Result<Self> {
        let start = match root {
            Some(dir) => dir,
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        Ok(Self { start, runtime })
    }

    /// Discover the fleet around the start directory.
    pub fn fleet(&self) -> Result<Fleet> {
        Fleet::discover_at(&self.start).with_context(|| {
            format!(
                "no fleet found at or above {} (looking for a git work tree with modules/)",
                self.start.display()
            )
        })
    }

    pub fn orchestrator(&self, fleet: &Fleet) -> Orchestrator {
        Orchestrator::from_settings(&fleet.settings)
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

// ---------------------------------------------------------------------------
// Shared output
// ---------------------------------------------------------------------------

/// Print every failed repository of a batch; true when there were any.
pub fn print_failures<T>(report: &BatchReport<T>) -> bool {
    let mut any = false;
    for failure in report.failures() {
        any = true;
        println!(
            "  {} {}: {}",
            "✗".red().bold(),
            failure.name,
            failure.error.as_deref().unwrap_or("failed")
        );
    }
    any
}

// ---------------------------------------------------------------------------
// fleet show
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "module")]
    module: String,
    #[tabled(rename = "repository")]
    repo: String,
    #[tabled(rename = "branch")]
    branch: String,
}

pub fn show(session: &Session) -> Result<()> {
    let fleet = session.fleet()?;
    println!(
        "Fleet v{} | {} | {} modules",
        env!("CARGO_PKG_VERSION"),
        fleet.root.display(),
        fleet.modules.len()
    );
    println!(
        "release: {}  build: {}",
        fleet
            .current_release_name()?
            .unwrap_or_else(|| "(none)".to_string())
            .bold(),
        fleet
            .current_build_name()?
            .unwrap_or_else(|| "(none)".to_string())
            .bold(),
    );

    let rows: Vec<ModuleRow> = fleet
        .modules
        .iter()
        .map(|(module, repo)| ModuleRow {
            module: module.clone(),
            repo: repo.name().to_string(),
            branch: repo
                .current_branch()
                .ok()
                .flatten()
                .unwrap_or_else(|| "(detached)".to_string()),
        })
        .collect();
    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for remote in fleet.sorted_remotes() {
        println!("remote {remote}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// fleet fetch
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Only fetch these remotes (default: every remote of each repository).
    pub remotes: Vec<String>,
}

impl FetchArgs {
    pub fn run(self, session: &Session) -> Result<()> {
        let fleet = session.fleet()?;
        let orch = session.orchestrator(&fleet);

        let fetched = session
            .block_on(fetch_all(&fleet, &orch, &self.remotes))
            .context("fetch failed")?;
        for report in &fetched.results {
            let failed: Vec<&str> = report
                .results
                .iter()
                .filter(|(_, ok)| !**ok)
                .map(|(remote, _)| remote.as_str())
                .collect();
            if failed.is_empty() {
                println!("{} {}", "✓".green(), report.name);
            } else {
                println!("{} {} (failed: {})", "✗".red(), report.name, failed.join(", "));
            }
        }

        let hierarchy = fleet_release::load(&fleet).context("failed to load release metadata")?;
        let retracked = session
            .block_on(retrack(&fleet, &orch, &hierarchy.module_branches()))
            .context("tracking branch update failed")?
            .into_result()?;
        for report in &retracked.results {
            for r in &report.results {
                println!("  {} {} now tracks {}", report.name, r.branch, r.remote);
            }
        }

        if !fetched.ok {
            bail!("some remotes could not be fetched");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// fleet clean
// ---------------------------------------------------------------------------

pub fn clean(session: &Session) -> Result<()> {
    let fleet = session.fleet()?;
    let orch = session.orchestrator(&fleet);
    let dirty = ensure_clean(session, &fleet, &orch)?;
    if dirty > 0 {
        bail!("{dirty} repositories have uncommitted changes");
    }
    println!("{} all repositories are clean", "✓".green());
    Ok(())
}

/// Print dirty repositories and return how many there were.
pub fn ensure_clean(session: &Session, fleet: &Fleet, orch: &Orchestrator) -> Result<usize> {
    let report = session
        .block_on(check_clean(fleet, orch))
        .context("status check failed")?;
    if print_failures(&report) {
        bail!("could not read the status of every repository");
    }
    let mut dirty = 0;
    for r in report.results.iter().filter(|r| !r.results.is_empty()) {
        dirty += 1;
        println!("{}", r.name.bold());
        for line in &r.results {
            println!("  {} {}", line.code.yellow(), line.path);
        }
    }
    Ok(dirty)
}
