use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn fleet_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fleet"));
    cmd.arg("-C")
        .arg(dir)
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1");
    cmd
}

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A fleet root with no modules and one development build. `None` when git
/// is not installed.
fn init_fleet() -> Option<TempDir> {
    let dir = TempDir::new().expect("tempdir");
    if !git(dir.path(), &["init", "-q"]) {
        return None;
    }
    fs::create_dir_all(dir.path().join("modules")).expect("modules dir");
    let master = dir.path().join("releases/development/master");
    fs::create_dir_all(&master).expect("build dir");
    fs::write(master.join("module-nova"), "master\n").expect("binding");
    fs::create_dir_all(dir.path().join("releases/grizzly/master")).expect("build dir");
    fs::write(dir.path().join("releases/grizzly/parent"), "development\n").expect("parent");
    assert!(git(dir.path(), &["config", "fleet.release", "development"]));
    assert!(git(dir.path(), &["config", "fleet.build", "development/master"]));
    Some(dir)
}

fn write_module(root: &Path, name: &str, yaml: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("module dir");
    fs::write(dir.join("module.yml"), yaml).expect("module.yml");
}

// ---------------------------------------------------------------------------
// deps
// ---------------------------------------------------------------------------

fn modules_dir() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write_module(dir.path(), "crowbar", "module:\n  name: crowbar\n");
    write_module(
        dir.path(),
        "database",
        "module:\n  name: database\n  requires: [crowbar]\n",
    );
    write_module(
        dir.path(),
        "nova",
        "module:\n  name: nova\n  requires: [database]\n",
    );
    dir
}

#[test]
fn deps_order_lists_fewest_dependencies_first() {
    let dir = modules_dir();
    let assert = fleet_cmd(dir.path())
        .args(["deps", "order"])
        .arg(dir.path().join("nova"))
        .arg(dir.path().join("database"))
        .arg(dir.path().join("crowbar"))
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let order: Vec<&str> = stdout.lines().collect();
    assert_eq!(order, vec!["crowbar", "database", "nova"]);
}

#[test]
fn deps_show_prints_ordered_dependencies() {
    let dir = modules_dir();
    fleet_cmd(dir.path())
        .args(["deps", "show", "nova"])
        .arg(dir.path().join("crowbar"))
        .arg(dir.path().join("database"))
        .arg(dir.path().join("nova"))
        .assert()
        .success()
        .stdout(predicate::eq("crowbar\ndatabase\n"));
}

#[test]
fn deps_order_with_another_root_module() {
    let dir = TempDir::new().expect("tempdir");
    write_module(dir.path(), "base", "module:\n  name: base\n");
    write_module(dir.path(), "app", "module:\n  name: app\n  requires: [base]\n");
    fleet_cmd(dir.path())
        .args(["deps", "order", "--root-module", "base"])
        .arg(dir.path().join("app"))
        .arg(dir.path().join("base"))
        .assert()
        .success()
        .stdout(predicate::eq("base\napp\n"));
}

#[test]
fn deps_cycle_fails() {
    let dir = TempDir::new().expect("tempdir");
    write_module(dir.path(), "crowbar", "module:\n  name: crowbar\n");
    write_module(dir.path(), "a", "module:\n  name: a\n  requires: [b]\n");
    write_module(dir.path(), "b", "module:\n  name: b\n  requires: [a]\n");
    fleet_cmd(dir.path())
        .args(["deps", "order"])
        .arg(dir.path().join("crowbar"))
        .arg(dir.path().join("a"))
        .arg(dir.path().join("b"))
        .assert()
        .code(1)
        .stderr(contains("depends on itself"));
}

// ---------------------------------------------------------------------------
// discovery and releases
// ---------------------------------------------------------------------------

#[test]
fn outside_a_fleet_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    fleet_cmd(dir.path())
        .arg("releases")
        .assert()
        .code(1)
        .stderr(contains("no fleet found"));
}

#[test]
fn releases_mark_the_current_one() {
    let Some(dir) = init_fleet() else { return };
    fleet_cmd(dir.path())
        .arg("releases")
        .assert()
        .success()
        .stdout(contains("* ").and(contains("development")).and(contains("  grizzly")));
}

#[test]
fn current_release_and_build() {
    let Some(dir) = init_fleet() else { return };
    fleet_cmd(dir.path())
        .arg("release")
        .assert()
        .success()
        .stdout(predicate::eq("development\n"));
    fleet_cmd(dir.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::eq("development/master\n"));
}

#[test]
fn builds_of_named_releases() {
    let Some(dir) = init_fleet() else { return };
    fleet_cmd(dir.path())
        .args(["builds", "grizzly"])
        .assert()
        .success()
        .stdout(predicate::eq("grizzly/master\n"));
}

#[test]
fn release_info_shows_parent_and_branch() {
    let Some(dir) = init_fleet() else { return };
    fleet_cmd(dir.path())
        .args(["release-info", "grizzly"])
        .assert()
        .success()
        .stdout(contains("parent: development").and(contains("branch: release/grizzly/master")));
}

#[test]
fn development_cannot_be_removed() {
    let Some(dir) = init_fleet() else { return };
    fleet_cmd(dir.path())
        .args(["remove-release", "development"])
        .assert()
        .code(1)
        .stderr(contains("cannot be removed"));
}

#[test]
fn master_build_cannot_be_removed() {
    let Some(dir) = init_fleet() else { return };
    fleet_cmd(dir.path())
        .args(["remove-build", "master"])
        .assert()
        .code(1)
        .stderr(contains("master build"));
}

// ---------------------------------------------------------------------------
// remotes
// ---------------------------------------------------------------------------

#[test]
fn remote_add_then_list() {
    let Some(dir) = init_fleet() else { return };
    fleet_cmd(dir.path())
        .args(["remote", "list"])
        .assert()
        .success()
        .stdout(contains("No remotes configured."));

    fleet_cmd(dir.path())
        .args(["remote", "add", "https://git.example.com/upstream", "--priority", "10"])
        .assert()
        .success()
        .stdout(contains("added remote upstream"));

    fleet_cmd(dir.path())
        .args(["remote", "list"])
        .assert()
        .success()
        .stdout(contains("upstream").and(contains("10")));

    fleet_cmd(dir.path())
        .args(["remote", "add", "https://other.example.com/upstream"])
        .assert()
        .code(1)
        .stderr(contains("already exists"));
}

#[test]
fn remote_add_rejects_bad_priority() {
    let Some(dir) = init_fleet() else { return };
    fleet_cmd(dir.path())
        .args(["remote", "add", "https://git.example.com/upstream", "--priority", "0"])
        .assert()
        .code(1)
        .stderr(contains("priority"));
}
