//! Removing releases and builds.

use std::collections::BTreeSet;
use std::path::Path;

use fleet_core::context::RELEASES_DIR;
use fleet_core::{Fleet, FleetError};

use crate::error::ReleaseError;
use crate::model::{bind, Hierarchy};
use crate::naming::{DEVELOPMENT, MASTER_BUILD};
use crate::split::metadata_path;
use crate::store;

/// Delete a release: its branches, its metadata, and its place in the tree.
///
/// Children of the release are reparented onto its own parent. Branch
/// deletion is sequential and stops at the first failure; branches still
/// bound by another release are kept.
pub fn remove_release(fleet: &Fleet, hierarchy: &Hierarchy, name: &str) -> Result<(), ReleaseError> {
    let release = hierarchy.release(name)?;
    if name == DEVELOPMENT {
        return Err(ReleaseError::ProtectedRelease(name.to_string()));
    }
    if fleet.current_release_name()?.as_deref() == Some(name) {
        return Err(ReleaseError::ActiveRelease(name.to_string()));
    }

    let shared: BTreeSet<(String, String)> = hierarchy
        .all_builds()
        .filter(|b| b.release != name)
        .flat_map(|b| b.modules.iter().map(|(m, br)| (m.clone(), br.clone())))
        .collect();

    for binding in bind(fleet, &hierarchy.release_modules(name)?)? {
        if shared.contains(&(binding.module.clone(), binding.branch.clone())) {
            tracing::info!(module = %binding.module, branch = %binding.branch, "branch still used elsewhere, keeping it");
            continue;
        }
        if !binding.repo.is_local_branch(&binding.branch) {
            tracing::warn!(module = %binding.module, branch = %binding.branch, "branch already gone");
            continue;
        }
        binding.repo.delete_branch(&binding.branch).map_err(|e| {
            FleetError::failed(
                binding.repo.name(),
                format!("failed to remove release branch {}: {e}", binding.branch),
            )
        })?;
        tracing::debug!(module = %binding.module, branch = %binding.branch, "deleted");
    }

    let releases = fleet.releases_dir();
    let mut changed = Vec::new();
    for child in hierarchy.child_releases(name) {
        store::set_release_parent_at(&releases, &child.name, release.parent.as_deref())?;
        tracing::info!(release = %child.name, parent = ?release.parent, "reparented");
        changed.push(metadata_path(&child.name));
    }

    let removed = metadata_path(name);
    fleet.core.remove_paths(&[removed.as_path()])?;
    if !changed.is_empty() {
        let paths: Vec<&Path> = changed.iter().map(|p| p.as_path()).collect();
        fleet.core.stage(&paths)?;
    }
    fleet.core.commit(&format!("Removed release {name}"))?;
    tracing::info!(release = %name, "release removed");
    Ok(())
}

/// Delete a build's metadata. The master build and builds that other builds
/// inherit from cannot be removed.
pub fn remove_build(fleet: &Fleet, hierarchy: &Hierarchy, full_name: &str) -> Result<(), ReleaseError> {
    let build = hierarchy.build(full_name)?;
    if build.parent.is_none() || build.name == MASTER_BUILD {
        return Err(ReleaseError::MasterBuild(full_name.to_string()));
    }
    let children: Vec<String> = hierarchy
        .child_builds(build)
        .into_iter()
        .map(|b| b.full_name())
        .collect();
    if !children.is_empty() {
        return Err(ReleaseError::HasChildren {
            build: full_name.to_string(),
            children,
        });
    }

    let path = Path::new(RELEASES_DIR).join(
        store::build_dir_at(Path::new(""), &build.release, &build.name),
    );
    fleet.core.remove_paths(&[path.as_path()])?;
    fleet.core.commit(&format!("Removed build {full_name}"))?;
    tracing::info!(build = %full_name, "build removed");
    Ok(())
}
