//! Checkpoint strategies: capture undo-relevant state before a risky
//! mutation and hand back the matching commit/rollback pair.
//!
//! Neither strategy does anything on commit; the mutation simply stands.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_core::{FleetError, RepoHandle};

use crate::token::{noop, Checkpoint};

/// Save the whole config store. Rollback writes the saved bytes back and
/// forces the repository to reload its config.
///
/// A failure to read the config is returned before anything is mutated.
pub fn config_checkpoint(repo: &RepoHandle) -> Result<Checkpoint, FleetError> {
    let saved = repo.read_config()?;
    let repo = Arc::clone(repo);
    Ok(Checkpoint {
        commit: noop(),
        rollback: Box::new(move || {
            let restored = match repo.write_config(&saved) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(repo = %repo.name(), error = %e, "failed to restore config");
                    false
                }
            };
            repo.reload_config();
            restored
        }),
    })
}

/// Where HEAD pointed when the checkpoint was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SavedHead {
    Branch(String),
    Detached(String),
    Unborn,
}

/// Record every local branch and HEAD. Rollback checks the old branch (or
/// detached commit) out again, force-moves every recorded branch back to its
/// saved commit, and deletes branches that did not exist at checkpoint time.
pub fn branch_checkpoint(repo: &RepoHandle) -> Result<Checkpoint, FleetError> {
    let saved: BTreeMap<String, String> = repo.branches()?.into_iter().collect();
    let head = match repo.current_branch()? {
        Some(branch) => SavedHead::Branch(branch),
        None => match repo.ref_commit("HEAD")? {
            Some(sha) => SavedHead::Detached(sha),
            None => SavedHead::Unborn,
        },
    };
    let repo = Arc::clone(repo);
    Ok(Checkpoint {
        commit: noop(),
        rollback: Box::new(move || restore_branches(repo.as_ref(), &saved, &head)),
    })
}

fn restore_head(repo: &dyn fleet_core::Repository, head: &SavedHead) -> bool {
    let current = repo.current_branch().ok().flatten();
    let restored = match head {
        SavedHead::Branch(branch) if current.as_deref() != Some(branch.as_str()) => {
            repo.checkout(branch)
        }
        SavedHead::Detached(sha) => {
            let at = repo.ref_commit("HEAD").ok().flatten();
            if current.is_none() && at.as_deref() == Some(sha.as_str()) {
                return true;
            }
            repo.checkout_detached(sha)
        }
        _ => return true,
    };
    match restored {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(repo = %repo.name(), head = ?head, error = %e, "failed to restore checkout");
            false
        }
    }
}

fn restore_branches(
    repo: &dyn fleet_core::Repository,
    saved: &BTreeMap<String, String>,
    head: &SavedHead,
) -> bool {
    let mut ok = restore_head(repo, head);

    for (name, sha) in saved {
        let moved = match repo.ref_commit(name) {
            Ok(current) => current.as_deref() != Some(sha.as_str()),
            Err(_) => true,
        };
        if !moved {
            continue;
        }
        if let Err(e) = repo.force_branch(name, sha) {
            tracing::error!(repo = %repo.name(), branch = %name, error = %e, "failed to restore branch");
            ok = false;
        }
    }

    match repo.branches() {
        Ok(now) => {
            for (name, _) in now.into_iter().filter(|(n, _)| !saved.contains_key(n)) {
                if let Err(e) = repo.delete_branch(&name) {
                    tracing::error!(repo = %repo.name(), branch = %name, error = %e, "failed to drop new branch");
                    ok = false;
                }
            }
        }
        Err(e) => {
            tracing::error!(repo = %repo.name(), error = %e, "failed to list branches");
            ok = false;
        }
    }

    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::memory::{FailOn, MemoryRepo};
    use fleet_core::Repository;

    fn handle(repo: MemoryRepo) -> (Arc<MemoryRepo>, RepoHandle) {
        let repo = Arc::new(repo);
        let h: RepoHandle = repo.clone();
        (repo, h)
    }

    #[test]
    fn branch_rollback_restores_every_recorded_branch() {
        let (repo, h) = handle(
            MemoryRepo::new("barclamp-nova")
                .with_branch("release/grizzly/master", "g1")
                .with_branch("feature/x/master", "f1"),
        );
        let before = repo.branch_map();
        let cp = branch_checkpoint(&h).unwrap();

        repo.checkout("feature/x/master").unwrap();
        repo.force_branch("release/grizzly/master", "zzz").unwrap();
        repo.force_branch("master", "yyy").unwrap();
        repo.create_branch("release/havana/master", "g1").unwrap();

        assert!((cp.rollback)());
        assert_eq!(repo.branch_map(), before);
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("master"));
    }

    #[test]
    fn branch_rollback_returns_to_detached_head() {
        let (repo, h) = handle(
            MemoryRepo::new("barclamp-nova")
                .with_branch("release/grizzly/master", "g1")
                .detached_at("d0"),
        );
        let cp = branch_checkpoint(&h).unwrap();

        repo.create_branch("release/havana/master", "g1").unwrap();
        repo.checkout("release/havana/master").unwrap();

        assert!((cp.rollback)());
        assert_eq!(repo.current_branch().unwrap(), None);
        assert_eq!(repo.ref_commit("HEAD").unwrap().as_deref(), Some("d0"));
        assert!(!repo.is_local_branch("release/havana/master"));
    }

    #[test]
    fn branch_rollback_reports_failure() {
        let (repo, h) = handle(MemoryRepo::new("barclamp-nova").with_branch("b", "1"));
        let cp = branch_checkpoint(&h).unwrap();
        repo.force_branch("b", "2").unwrap();
        repo.fail_on(FailOn::ForceBranch);
        assert!(!(cp.rollback)());
    }

    #[test]
    fn config_rollback_restores_bytes_and_reloads() {
        let (repo, h) = handle(MemoryRepo::new("crowbar").with_config("core.bare", "false"));
        let cp = config_checkpoint(&h).unwrap();
        repo.config_set("branch.master.remote", "origin").unwrap();

        assert!((cp.rollback)());
        assert_eq!(repo.config_get("branch.master.remote").unwrap(), None);
        assert_eq!(repo.config_get("core.bare").unwrap().as_deref(), Some("false"));
        assert!(repo.operations().contains(&"reload config".to_string()));
    }

    #[test]
    fn config_checkpoint_setup_failure_is_an_error() {
        let (repo, h) = handle(MemoryRepo::new("crowbar"));
        repo.fail_on(FailOn::ReadConfig);
        assert!(config_checkpoint(&h).is_err());
    }

    #[test]
    fn config_commit_is_noop() {
        let (repo, h) = handle(MemoryRepo::new("crowbar"));
        let cp = config_checkpoint(&h).unwrap();
        repo.config_set("x.y", "1").unwrap();
        assert!((cp.commit)());
        assert_eq!(repo.config_get("x.y").unwrap().as_deref(), Some("1"));
    }
}
