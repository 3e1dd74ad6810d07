//! Whole-fleet batch operations: fetch, clean check, tracking-branch
//! recomputation.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_core::{FetchOutcome, Fleet, FleetError, Remote, StatusLine};

use crate::checkpoint::config_checkpoint;
use crate::orchestrator::{BatchReport, Orchestrator};
use crate::token::ResultToken;

/// Module name to every branch any build binds it to.
pub type BranchMap = BTreeMap<String, Vec<String>>;

/// A branch that started tracking a different remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retracked {
    pub branch: String,
    pub remote: String,
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Fetch `remotes` (every remote when empty) in every repository of the fleet.
///
/// Nothing is undone on failure; a failed fetch only marks the batch not-ok.
pub async fn fetch_all(
    fleet: &Fleet,
    orch: &Orchestrator,
    remotes: &[String],
) -> Result<BatchReport<FetchOutcome>, FleetError> {
    let remotes: Arc<[String]> = remotes.into();
    orch.run(
        &fleet.all_repos(),
        move |name, repo| {
            let (ok, outcome) = repo.fetch(&remotes);
            let mut token = ResultToken::new(name).with_results(outcome);
            if !ok {
                token.fail("fetch failed");
            }
            token
        },
        |token| {
            if token.ok {
                tracing::info!(repo = %token.name, "fetched");
            } else {
                let failed: Vec<&str> = token
                    .results
                    .iter()
                    .filter(|(_, ok)| !**ok)
                    .map(|(r, _)| r.as_str())
                    .collect();
                tracing::warn!(repo = %token.name, remotes = ?failed, "fetch failed");
            }
        },
    )
    .await
}

// ---------------------------------------------------------------------------
// Clean check
// ---------------------------------------------------------------------------

/// Dirty status lines per repository. A repository is ok when it has none.
pub async fn check_clean(
    fleet: &Fleet,
    orch: &Orchestrator,
) -> Result<BatchReport<Vec<StatusLine>>, FleetError> {
    orch.run(
        &fleet.all_repos(),
        |name, repo| match repo.status() {
            Ok(lines) => {
                let clean = lines.is_empty();
                let mut token = ResultToken::new(name).with_results(lines);
                if !clean {
                    token.fail("work tree has local changes");
                }
                token
            }
            Err(e) => ResultToken::failed(name, e),
        },
        |token| tracing::debug!(repo = %token.name, clean = token.ok, "status"),
    )
    .await
}

// ---------------------------------------------------------------------------
// Tracking branches
// ---------------------------------------------------------------------------

/// Recompute which remote every bound local branch tracks.
///
/// For each branch, remotes are walked in priority order: a remote the
/// repository lacks is skipped, a remote the branch already tracks ends the
/// walk, and the first remote holding a matching ref becomes the new upstream.
/// Every repository is config-checkpointed, so one failure restores them all.
pub async fn retrack(
    fleet: &Fleet,
    orch: &Orchestrator,
    branches: &BranchMap,
) -> Result<BatchReport<Vec<Retracked>>, FleetError> {
    let branches = Arc::new(branches.clone());
    let remotes: Arc<Vec<Remote>> = Arc::new(fleet.sorted_remotes());
    tracing::info!("updating local tracking branches");

    orch.run(
        &fleet.modules,
        move |name, repo| {
            let mut token = ResultToken::new(name);
            match config_checkpoint(repo) {
                Ok(cp) => token.set_checkpoint(cp),
                Err(e) => {
                    token.fail(e);
                    return token;
                }
            }

            let mut changed = Vec::new();
            for branch in branches.get(name).into_iter().flatten() {
                if !repo.is_local_branch(branch) {
                    continue;
                }
                let current = repo.tracked_remote(branch).ok().flatten();
                for remote in remotes.iter() {
                    if !repo.has_remote(&remote.name) {
                        continue;
                    }
                    if current.as_deref() == Some(remote.name.as_str()) {
                        break;
                    }
                    if !repo.has_remote_ref(&remote.name, branch) {
                        continue;
                    }
                    tracing::info!(repo = %name, branch = %branch, remote = %remote.name, "tracking");
                    match repo.track_remote(branch, &remote.name) {
                        Ok(()) => changed.push(Retracked {
                            branch: branch.clone(),
                            remote: remote.name.clone(),
                        }),
                        Err(e) => token.fail(e),
                    }
                    break;
                }
            }
            token.with_results(changed)
        },
        |token| {
            if !token.ok {
                tracing::warn!(repo = %token.name, error = ?token.error, "retrack failed");
            }
        },
    )
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use fleet_core::memory::{FailOn, MemoryRepo};
    use fleet_core::{RepoHandle, RepoSet, Repository, Settings};

    fn fleet(core: MemoryRepo, modules: Vec<(&str, Arc<MemoryRepo>)>) -> Fleet {
        let modules: RepoSet = modules
            .into_iter()
            .map(|(n, r)| (n.to_string(), r as RepoHandle))
            .collect();
        Fleet::from_parts(PathBuf::from("/fleet"), Arc::new(core), modules, Settings::default())
            .unwrap()
    }

    fn core_with_remotes() -> MemoryRepo {
        MemoryRepo::new("crowbar")
            .with_config("fleet.remote.origin.urlbase", "https://github.com/crowbar")
            .with_config("fleet.remote.origin.priority", "10")
            .with_config("fleet.remote.personal.urlbase", "https://github.com/me")
            .with_config("fleet.remote.personal.priority", "20")
    }

    #[tokio::test]
    async fn fetch_reports_failed_remotes() {
        let nova = Arc::new(
            MemoryRepo::new("barclamp-nova")
                .with_remote("origin", "https://github.com/crowbar/barclamp-nova")
                .with_remote("personal", "https://github.com/me/barclamp-nova")
                .with_unreachable_remote("personal"),
        );
        let f = fleet(
            MemoryRepo::new("crowbar").with_remote("origin", "https://github.com/crowbar/crowbar"),
            vec![("nova", nova)],
        );
        let report = fetch_all(&f, &Orchestrator::new(4, None), &[]).await.unwrap();
        assert!(!report.ok);
        let names: Vec<&str> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["barclamp-nova", "crowbar"]);
        assert_eq!(report.results[0].results.get("personal"), Some(&false));
        assert!(report.results[1].ok);
    }

    #[tokio::test]
    async fn dirty_repository_fails_clean_check() {
        let nova = Arc::new(
            MemoryRepo::new("barclamp-nova")
                .with_status(vec![StatusLine::parse(" M chef/recipes/default.rb").unwrap()]),
        );
        let f = fleet(MemoryRepo::new("crowbar"), vec![("nova", nova)]);
        let report = check_clean(&f, &Orchestrator::new(4, None)).await.unwrap();
        assert!(!report.ok);
        let dirty: Vec<&str> = report.failures().map(|r| r.name.as_str()).collect();
        assert_eq!(dirty, vec!["barclamp-nova"]);
    }

    #[tokio::test]
    async fn retrack_prefers_highest_priority_remote_with_ref() {
        let nova = Arc::new(
            MemoryRepo::new("barclamp-nova")
                .with_branch("release/grizzly/master", "g1")
                .with_remote("origin", "https://github.com/crowbar/barclamp-nova")
                .with_remote("personal", "https://github.com/me/barclamp-nova")
                .with_remote_ref("personal", "release/grizzly/master")
                .with_remote_ref("origin", "master"),
        );
        let f = fleet(core_with_remotes(), vec![("nova", Arc::clone(&nova))]);
        let map: BranchMap = [(
            "nova".to_string(),
            vec!["master".to_string(), "release/grizzly/master".to_string(), "gone".to_string()],
        )]
        .into();

        let report = retrack(&f, &Orchestrator::new(4, None), &map).await.unwrap();
        assert!(report.ok);
        assert_eq!(
            report.results[0].results,
            vec![
                Retracked { branch: "master".into(), remote: "origin".into() },
                Retracked { branch: "release/grizzly/master".into(), remote: "personal".into() },
            ]
        );
        assert_eq!(nova.tracked_remote("master").unwrap().as_deref(), Some("origin"));
    }

    #[tokio::test]
    async fn retrack_stops_at_already_tracked_remote() {
        let nova = Arc::new(
            MemoryRepo::new("barclamp-nova")
                .with_remote("origin", "https://github.com/crowbar/barclamp-nova")
                .with_remote("personal", "https://github.com/me/barclamp-nova")
                .with_remote_ref("personal", "master"),
        );
        nova.track_remote("master", "origin").unwrap();
        let f = fleet(core_with_remotes(), vec![("nova", Arc::clone(&nova))]);
        let map: BranchMap = [("nova".to_string(), vec!["master".to_string()])].into();

        let report = retrack(&f, &Orchestrator::new(4, None), &map).await.unwrap();
        assert!(report.ok);
        assert!(report.results[0].results.is_empty());
        assert_eq!(nova.tracked_remote("master").unwrap().as_deref(), Some("origin"));
    }

    #[tokio::test]
    async fn retrack_failure_restores_every_config() {
        let nova = Arc::new(
            MemoryRepo::new("barclamp-nova")
                .with_remote("origin", "u")
                .with_remote_ref("origin", "master"),
        );
        let swift = Arc::new(
            MemoryRepo::new("barclamp-swift")
                .with_remote("origin", "u")
                .with_remote_ref("origin", "master"),
        );
        swift.fail_on(FailOn::TrackRemote);
        let f = fleet(
            core_with_remotes(),
            vec![("nova", Arc::clone(&nova)), ("swift", Arc::clone(&swift))],
        );
        let map: BranchMap = [
            ("nova".to_string(), vec!["master".to_string()]),
            ("swift".to_string(), vec!["master".to_string()]),
        ]
        .into();

        let report = retrack(&f, &Orchestrator::new(4, None), &map).await.unwrap();
        assert!(!report.ok);
        assert_eq!(nova.tracked_remote("master").unwrap(), None);
        assert!(nova.operations().contains(&"write config".to_string()));
    }
}
