use std::path::PathBuf;
use std::sync::Arc;

use fleet_batch::remotes::{add_remote, remove_remote, rename_remote, set_urlbase, sync_remotes};
use fleet_batch::Orchestrator;
use fleet_core::memory::{FailOn, MemoryRepo};
use fleet_core::{Fleet, FleetError, Remote, RepoHandle, RepoSet, Repository, Settings};

struct Fixture {
    fleet: Fleet,
    core: Arc<MemoryRepo>,
    nova: Arc<MemoryRepo>,
    swift: Arc<MemoryRepo>,
}

fn fixture() -> Fixture {
    let core = Arc::new(
        MemoryRepo::new("crowbar")
            .with_remote("origin", "https://github.com/crowbar/crowbar")
            .with_config("fleet.remote.origin.urlbase", "https://github.com/crowbar")
            .with_config("fleet.remote.origin.priority", "10"),
    );
    let nova = Arc::new(
        MemoryRepo::new("barclamp-nova")
            .with_remote("origin", "https://github.com/crowbar/barclamp-nova"),
    );
    let swift = Arc::new(MemoryRepo::new("barclamp-swift"));
    let modules: RepoSet = [
        ("nova".to_string(), Arc::clone(&nova) as RepoHandle),
        ("swift".to_string(), Arc::clone(&swift) as RepoHandle),
    ]
    .into();
    let fleet = Fleet::from_parts(
        PathBuf::from("/fleet"),
        Arc::clone(&core) as RepoHandle,
        modules,
        Settings::default(),
    )
    .unwrap();
    Fixture { fleet, core, nova, swift }
}

fn orch() -> Orchestrator {
    Orchestrator::new(4, None)
}

#[tokio::test]
async fn add_remote_reaches_every_repository_and_persists() {
    let mut fx = fixture();
    let remote = Remote::new("personal", "https://github.com/me", 20);

    let report = add_remote(&mut fx.fleet, &orch(), remote).await.unwrap();
    assert!(report.ok);
    assert_eq!(
        fx.nova.remotes().unwrap().get("personal").map(String::as_str),
        Some("https://github.com/me/barclamp-nova")
    );
    assert_eq!(
        fx.core.remotes().unwrap().get("personal").map(String::as_str),
        Some("https://github.com/me/crowbar")
    );
    assert_eq!(
        fx.core.config_get("fleet.remote.personal.priority").unwrap().as_deref(),
        Some("20")
    );
    assert_eq!(fx.fleet.remote("personal").unwrap().priority, 20);
}

#[tokio::test]
async fn duplicate_remote_is_a_conflict_without_mutation() {
    let mut fx = fixture();
    let err = add_remote(&mut fx.fleet, &orch(), Remote::new("origin", "https://x.example.com/a", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)));
    assert!(fx.nova.operations().is_empty());
}

#[tokio::test]
async fn failed_add_rolls_back_every_repository() {
    let mut fx = fixture();
    fx.swift.fail_on(FailOn::AddRemote);

    let err = add_remote(&mut fx.fleet, &orch(), Remote::new("personal", "https://github.com/me", 20))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::OperationFailed { .. }));
    assert!(!fx.nova.has_remote("personal"));
    assert!(!fx.core.has_remote("personal"));
    assert_eq!(fx.core.config_get("fleet.remote.personal.urlbase").unwrap(), None);
    assert!(fx.fleet.remote("personal").is_err());
}

#[tokio::test]
async fn remove_skips_repositories_without_the_remote() {
    let mut fx = fixture();
    let report = remove_remote(&mut fx.fleet, &orch(), "origin").await.unwrap();
    assert!(report.ok);
    assert!(!fx.nova.has_remote("origin"));
    assert!(!fx.core.has_remote("origin"));
    assert!(fx.swift.operations().is_empty());
    assert_eq!(fx.core.config_get("fleet.remote.origin.urlbase").unwrap(), None);
}

#[tokio::test]
async fn remove_unknown_remote_is_not_found() {
    let mut fx = fixture();
    let err = remove_remote(&mut fx.fleet, &orch(), "nope").await.unwrap_err();
    assert!(matches!(err, FleetError::NotFound { kind: "remote", .. }));
}

#[tokio::test]
async fn failed_remove_restores_removed_remotes() {
    let mut fx = fixture();
    fx.nova.fail_on(FailOn::RemoveRemote);
    remove_remote(&mut fx.fleet, &orch(), "origin").await.unwrap_err();
    assert_eq!(
        fx.core.remotes().unwrap().get("origin").map(String::as_str),
        Some("https://github.com/crowbar/crowbar")
    );
    assert!(fx.fleet.remote("origin").is_ok());
}

#[tokio::test]
async fn rename_moves_config_and_repository_remotes() {
    let mut fx = fixture();
    rename_remote(&mut fx.fleet, &orch(), "origin", "upstream").await.unwrap();
    assert!(fx.nova.has_remote("upstream"));
    assert!(!fx.nova.has_remote("origin"));
    assert_eq!(fx.core.config_get("fleet.remote.origin.urlbase").unwrap(), None);
    assert_eq!(
        fx.core.config_get("fleet.remote.upstream.priority").unwrap().as_deref(),
        Some("10")
    );
    assert_eq!(fx.fleet.remote("upstream").unwrap().urlbase, "https://github.com/crowbar");
}

#[tokio::test]
async fn rename_onto_existing_remote_is_a_conflict() {
    let mut fx = fixture();
    add_remote(&mut fx.fleet, &orch(), Remote::new("personal", "https://github.com/me", 20))
        .await
        .unwrap();
    let err = rename_remote(&mut fx.fleet, &orch(), "origin", "personal").await.unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)));
}

#[tokio::test]
async fn set_urlbase_replaces_urls() {
    let mut fx = fixture();
    set_urlbase(&mut fx.fleet, &orch(), "origin", "https://git.example.com/crowbar")
        .await
        .unwrap();
    assert_eq!(
        fx.nova.remotes().unwrap().get("origin").map(String::as_str),
        Some("https://git.example.com/crowbar/barclamp-nova")
    );
    assert_eq!(
        fx.core.config_get("fleet.remote.origin.urlbase").unwrap().as_deref(),
        Some("https://git.example.com/crowbar")
    );
}

#[tokio::test]
async fn sync_adds_reachable_missing_remotes_only() {
    let core = Arc::new(
        MemoryRepo::new("crowbar")
            .with_remote("origin", "https://old.example.com/crowbar")
            .with_reachable_url("https://github.com/crowbar/crowbar")
            .with_config("fleet.remote.origin.urlbase", "https://github.com/crowbar"),
    );
    let nova = Arc::new(
        MemoryRepo::new("barclamp-nova").with_reachable_url("https://github.com/crowbar/barclamp-nova"),
    );
    let swift = Arc::new(MemoryRepo::new("barclamp-swift"));
    let modules: RepoSet = [
        ("nova".to_string(), Arc::clone(&nova) as RepoHandle),
        ("swift".to_string(), Arc::clone(&swift) as RepoHandle),
    ]
    .into();
    let fleet = Fleet::from_parts(
        PathBuf::from("/fleet"),
        Arc::clone(&core) as RepoHandle,
        modules,
        Settings::default(),
    )
    .unwrap();

    let report = sync_remotes(&fleet, &orch()).await.unwrap();
    assert!(report.ok);
    assert_eq!(
        core.remotes().unwrap().get("origin").map(String::as_str),
        Some("https://github.com/crowbar/crowbar")
    );
    assert!(nova.has_remote("origin"));
    assert!(!swift.has_remote("origin"));
    let swift_report = report.results.iter().find(|r| r.name == "barclamp-swift").unwrap();
    assert!(swift_report.results.is_empty());
}
