//! `fleet deps`: dependency order of module declarations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use fleet_core::Settings;
use fleet_deps::{load_declarations, resolve, Resolution};

#[derive(Subcommand, Debug)]
pub enum DepsCommand {
    /// Print every module, fewest dependencies first.
    Order(OrderArgs),
    /// Print the ordered dependencies of one module.
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Module directories or `module.yml` files.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Module every other module depends on.
    #[arg(long, value_name = "MODULE")]
    pub root_module: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub module: String,

    /// Module directories or `module.yml` files.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Module every other module depends on.
    #[arg(long, value_name = "MODULE")]
    pub root_module: Option<String>,
}

pub fn run(command: DepsCommand) -> Result<()> {
    match command {
        DepsCommand::Order(args) => {
            let resolution = load_and_resolve(&args.paths, args.root_module)?;
            for module in &resolution.order {
                println!("{module}");
            }
        }
        DepsCommand::Show(args) => {
            let resolution = load_and_resolve(&args.paths, args.root_module)?;
            let deps = resolution
                .deps_of(&args.module)
                .with_context(|| format!("module '{}' is not among the declarations", args.module))?;
            if deps.is_empty() {
                println!("{} has no dependencies", args.module);
            }
            for dep in deps {
                println!("{dep}");
            }
        }
    }
    Ok(())
}

fn load_and_resolve(paths: &[PathBuf], root: Option<String>) -> Result<Resolution> {
    let root = root.unwrap_or_else(|| Settings::default().root_module);
    let decls = load_declarations(paths).context("failed to load module declarations")?;
    tracing::debug!(count = decls.len(), root = %root, "resolving");
    resolve(&decls, &root).context("dependency resolution failed")
}
