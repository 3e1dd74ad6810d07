//! Forking a new release off an existing one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleet_batch::{branch_checkpoint, Orchestrator, ResultToken};
use fleet_core::context::RELEASES_DIR;
use fleet_core::{Fleet, FleetError, RepoSet};

use crate::error::ReleaseError;
use crate::model::{bind, Hierarchy, Release};
use crate::naming::release_branch;
use crate::store;

/// Path of a release's metadata relative to the core work tree.
pub(crate) fn metadata_path(release: &str) -> PathBuf {
    Path::new(RELEASES_DIR).join(store::release_dir_at(Path::new(""), release))
}

/// Create release `to` from `from`.
///
/// Every module bound anywhere in `from` gets the new release branch,
/// created at the commit its current binding points at. All bindings are
/// checked before any branch is created; branch creation itself runs as one
/// batch, so a failure in any repository removes the branches already made.
/// The new metadata is committed only after every branch exists.
pub async fn split_release(
    fleet: &Fleet,
    orch: &Orchestrator,
    hierarchy: &Hierarchy,
    from: &str,
    to: &str,
) -> Result<Release, ReleaseError> {
    if hierarchy.releases.contains_key(to) {
        return Err(FleetError::Conflict(format!(
            "release '{to}' already exists, cannot create it"
        ))
        .into());
    }
    let new_branch = release_branch(to)?;
    let bindings = bind(fleet, &hierarchy.release_modules(from)?)?;

    let mut bases = BTreeMap::new();
    for binding in &bindings {
        let base = binding
            .repo
            .ref_commit(&binding.branch)?
            .ok_or_else(|| FleetError::BaseRefMissing {
                module: binding.module.clone(),
                branch: binding.branch.clone(),
                release: from.to_string(),
            })?;
        if binding.repo.ref_commit(&new_branch)?.is_some() {
            return Err(FleetError::BranchAlreadyExists {
                module: binding.module.clone(),
                branch: new_branch,
            }
            .into());
        }
        bases.insert(binding.module.clone(), base);
    }

    let repos: RepoSet = bindings
        .iter()
        .map(|b| (b.module.clone(), Arc::clone(&b.repo)))
        .collect();
    let bases = Arc::new(bases);
    let branch = new_branch.clone();
    orch.run(
        &repos,
        move |module, repo| {
            let mut token = ResultToken::<()>::new(module);
            match branch_checkpoint(repo) {
                Ok(cp) => token.set_checkpoint(cp),
                Err(e) => {
                    token.fail(e);
                    return token;
                }
            }
            match bases.get(module) {
                Some(base) => {
                    if let Err(e) = repo.create_branch(&branch, base) {
                        token.fail(e);
                    }
                }
                None => token.fail("no validated base commit"),
            }
            token
        },
        |token| {
            if !token.ok {
                tracing::warn!(module = %token.name, error = ?token.error, "branch creation failed");
            }
        },
    )
    .await?
    .into_result()?;

    let releases = fleet.releases_dir();
    store::clone_release_at(&releases, from, to, &new_branch)?;
    let changed = metadata_path(to);
    fleet.core.stage(&[changed.as_path()])?;
    fleet.core.commit(&format!("Added new release {to}"))?;
    tracing::info!(release = %to, parent = %from, branch = %new_branch, "release created");

    store::load_release_at(&releases, to)
}
