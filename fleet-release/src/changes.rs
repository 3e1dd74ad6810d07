//! Unmerged-change reports, using `git cherry` semantics.

use fleet_core::Fleet;

use crate::error::ReleaseError;
use crate::model::{bind, Hierarchy, ModuleBinding};

/// Commits present in `head` but not in `base` for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Published repository name.
    pub repo: String,
    pub base: String,
    pub head: String,
    pub commits: Vec<String>,
}

/// Local commits on each bound branch that its upstream does not have.
pub fn local_changes(
    fleet: &Fleet,
    hierarchy: &Hierarchy,
    release: &str,
) -> Result<Vec<ChangeSet>, ReleaseError> {
    tracked_changes(fleet, hierarchy, release, false)
}

/// Fetched upstream commits not yet merged into each bound branch.
pub fn remote_changes(
    fleet: &Fleet,
    hierarchy: &Hierarchy,
    release: &str,
) -> Result<Vec<ChangeSet>, ReleaseError> {
    tracked_changes(fleet, hierarchy, release, true)
}

/// Commits in `target` that `base` lacks, for modules both releases bind.
pub fn cross_release_changes(
    fleet: &Fleet,
    hierarchy: &Hierarchy,
    target: &str,
    base: &str,
) -> Result<Vec<ChangeSet>, ReleaseError> {
    let base_modules = hierarchy.release_modules(base)?;
    let target_modules = hierarchy.release_modules(target)?;

    let mut changes = Vec::new();
    for binding in bind(fleet, &target_modules)? {
        let Some(base_branch) = base_modules.get(&binding.module) else {
            continue;
        };
        if !has_ref(&binding, base_branch) || !has_ref(&binding, &binding.branch) {
            continue;
        }
        push_changes(&mut changes, &binding, base_branch, &binding.branch, base, target);
    }
    changes.sort_by(|a, b| a.repo.cmp(&b.repo));
    Ok(changes)
}

fn tracked_changes(
    fleet: &Fleet,
    hierarchy: &Hierarchy,
    release: &str,
    incoming: bool,
) -> Result<Vec<ChangeSet>, ReleaseError> {
    let mut changes = Vec::new();
    for binding in bind(fleet, &hierarchy.release_modules(release)?)? {
        if !binding.repo.is_local_branch(&binding.branch) {
            continue;
        }
        let Ok(Some(remote)) = binding.repo.tracked_remote(&binding.branch) else {
            continue;
        };
        let upstream = format!("{remote}/{}", binding.branch);
        if incoming {
            push_changes(&mut changes, &binding, &binding.branch, &upstream, "local", "upstream");
        } else {
            push_changes(&mut changes, &binding, &upstream, &binding.branch, "upstream", "local");
        }
    }
    changes.sort_by(|a, b| a.repo.cmp(&b.repo));
    Ok(changes)
}

fn has_ref(binding: &ModuleBinding, name: &str) -> bool {
    matches!(binding.repo.ref_commit(name), Ok(Some(_)))
}

fn push_changes(
    out: &mut Vec<ChangeSet>,
    binding: &ModuleBinding,
    base_ref: &str,
    head_ref: &str,
    base_label: &str,
    head_label: &str,
) {
    match binding.repo.cherry(base_ref, head_ref) {
        Ok(commits) if !commits.is_empty() => out.push(ChangeSet {
            repo: binding.repo.name().to_string(),
            base: base_label.to_string(),
            head: head_label.to_string(),
            commits,
        }),
        Ok(_) => {}
        Err(e) => tracing::debug!(repo = %binding.repo.name(), error = %e, "cherry failed"),
    }
}
