//! In-memory [`Repository`] for deterministic tests.
//!
//! Branches, remotes, config and remote refs live behind a mutex. Individual
//! operations can be told to fail, and every mutating call is recorded so
//! tests can assert on exactly what happened.
//!
//! ```
//! use fleet_core::memory::{FailOn, MemoryRepo};
//! use fleet_core::Repository;
//!
//! let repo = MemoryRepo::new("barclamp-nova").with_branch("release/grizzly/master", "c2");
//! assert_eq!(repo.ref_commit("release/grizzly/master").unwrap().as_deref(), Some("c2"));
//!
//! repo.fail_on(FailOn::Checkout);
//! assert!(repo.checkout("release/grizzly/master").is_err());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{io_err, FleetError};
use crate::repo::{RepoResult, Repository};
use crate::types::{FetchOutcome, StatusLine};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailOn {
    Fetch,
    Status,
    Checkout,
    CreateBranch,
    ForceBranch,
    DeleteBranch,
    TrackRemote,
    AddRemote,
    RemoveRemote,
    RenameRemote,
    ReadConfig,
    WriteConfig,
    ConfigSet,
    Commit,
}

#[derive(Debug, Default)]
struct Inner {
    branches: BTreeMap<String, String>,
    head: Option<String>,
    detached: Option<String>,
    upstreams: BTreeMap<String, String>,
    remotes: BTreeMap<String, String>,
    remote_refs: BTreeSet<(String, String)>,
    unreachable_remotes: BTreeSet<String>,
    reachable_urls: BTreeSet<String>,
    config: BTreeMap<String, String>,
    status: Vec<StatusLine>,
    cherries: BTreeMap<(String, String), Vec<String>>,
    fail: BTreeSet<FailOn>,
    operations: Vec<String>,
    commits: Vec<String>,
}

/// Thread-safe in-memory repository.
#[derive(Debug)]
pub struct MemoryRepo {
    name: String,
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl MemoryRepo {
    /// A repository with a single `master` branch checked out at `<name>-root`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut inner = Inner::default();
        inner
            .branches
            .insert("master".to_string(), format!("{name}-root"));
        inner.head = Some("master".to_string());
        Self {
            path: PathBuf::from("/nonexistent").join(&name),
            name,
            inner: Mutex::new(inner),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Detach HEAD at `commit`.
    pub fn detached_at(self, commit: &str) -> Self {
        let mut inner = self.lock();
        inner.head = None;
        inner.detached = Some(commit.to_string());
        drop(inner);
        self
    }

    pub fn with_branch(self, name: &str, commit: &str) -> Self {
        self.lock()
            .branches
            .insert(name.to_string(), commit.to_string());
        self
    }

    pub fn with_remote(self, name: &str, url: &str) -> Self {
        self.lock().remotes.insert(name.to_string(), url.to_string());
        self
    }

    pub fn with_remote_ref(self, remote: &str, branch: &str) -> Self {
        self.lock()
            .remote_refs
            .insert((remote.to_string(), branch.to_string()));
        self
    }

    pub fn with_config(self, key: &str, value: &str) -> Self {
        self.lock().config.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_status(self, lines: Vec<StatusLine>) -> Self {
        self.lock().status = lines;
        self
    }

    pub fn with_cherry(self, base: &str, head: &str, commits: &[&str]) -> Self {
        self.lock().cherries.insert(
            (base.to_string(), head.to_string()),
            commits.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Fetches from `remote` will fail.
    pub fn with_unreachable_remote(self, remote: &str) -> Self {
        self.lock().unreachable_remotes.insert(remote.to_string());
        self
    }

    /// `probe_url(url)` will succeed.
    pub fn with_reachable_url(self, url: &str) -> Self {
        self.lock().reachable_urls.insert(url.to_string());
        self
    }

    /// Make every future call of `op` fail.
    pub fn fail_on(&self, op: FailOn) {
        self.lock().fail.insert(op);
    }

    pub fn clear_failures(&self) {
        self.lock().fail.clear();
    }

    /// Every mutating call so far, e.g. `"checkout release/x/master"`.
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    /// Messages of every metadata commit.
    pub fn commits(&self) -> Vec<String> {
        self.lock().commits.clone()
    }

    /// Snapshot of all local branches.
    pub fn branch_map(&self) -> BTreeMap<String, String> {
        self.lock().branches.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A test thread panicking while holding the lock must not hide state
        // from later assertions.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn guard(&self, inner: &Inner, op: FailOn) -> RepoResult<()> {
        if inner.fail.contains(&op) {
            return Err(FleetError::failed(&self.name, format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

fn render_config(config: &BTreeMap<String, String>) -> Vec<u8> {
    let mut out = String::new();
    for (k, v) in config {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
    out.into_bytes()
}

fn parse_config(bytes: &[u8]) -> BTreeMap<String, String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Repository for MemoryRepo {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn fetch(&self, remotes: &[String]) -> (bool, FetchOutcome) {
        let mut inner = self.lock();
        let failing = inner.fail.contains(&FailOn::Fetch);
        let targets: Vec<String> = if remotes.is_empty() {
            inner.remotes.keys().cloned().collect()
        } else {
            remotes.to_vec()
        };
        let outcome: FetchOutcome = targets
            .into_iter()
            .map(|r| {
                let ok = !failing
                    && inner.remotes.contains_key(&r)
                    && !inner.unreachable_remotes.contains(&r);
                (r, ok)
            })
            .collect();
        inner.operations.push("fetch".to_string());
        (!failing && outcome.values().all(|ok| *ok), outcome)
    }

    fn probe_url(&self, url: &str) -> bool {
        self.lock().reachable_urls.contains(url)
    }

    fn status(&self) -> RepoResult<Vec<StatusLine>> {
        let inner = self.lock();
        self.guard(&inner, FailOn::Status)?;
        Ok(inner.status.clone())
    }

    fn ref_commit(&self, name: &str) -> RepoResult<Option<String>> {
        let inner = self.lock();
        if name == "HEAD" {
            return Ok(match &inner.head {
                Some(h) => inner.branches.get(h).cloned(),
                None => inner.detached.clone(),
            });
        }
        Ok(inner.branches.get(name).cloned())
    }

    fn is_local_branch(&self, name: &str) -> bool {
        self.lock().branches.contains_key(name)
    }

    fn current_branch(&self) -> RepoResult<Option<String>> {
        Ok(self.lock().head.clone())
    }

    fn branches(&self) -> RepoResult<Vec<(String, String)>> {
        Ok(self
            .lock()
            .branches
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn create_branch(&self, name: &str, commit: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::CreateBranch)?;
        if inner.branches.contains_key(name) {
            return Err(FleetError::failed(
                &self.name,
                format!("branch '{name}' already exists"),
            ));
        }
        inner.branches.insert(name.to_string(), commit.to_string());
        inner.operations.push(format!("branch {name} {commit}"));
        Ok(())
    }

    fn force_branch(&self, name: &str, commit: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::ForceBranch)?;
        inner.branches.insert(name.to_string(), commit.to_string());
        inner.operations.push(format!("branch -f {name} {commit}"));
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::DeleteBranch)?;
        if inner.head.as_deref() == Some(name) {
            return Err(FleetError::failed(
                &self.name,
                format!("cannot delete checked-out branch '{name}'"),
            ));
        }
        if inner.branches.remove(name).is_none() {
            return Err(FleetError::failed(
                &self.name,
                format!("branch '{name}' not found"),
            ));
        }
        inner.operations.push(format!("branch -D {name}"));
        Ok(())
    }

    fn checkout(&self, branch: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::Checkout)?;
        if !inner.branches.contains_key(branch) {
            return Err(FleetError::failed(
                &self.name,
                format!("pathspec '{branch}' did not match"),
            ));
        }
        inner.head = Some(branch.to_string());
        inner.detached = None;
        inner.operations.push(format!("checkout {branch}"));
        Ok(())
    }

    fn checkout_detached(&self, commit: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::Checkout)?;
        inner.head = None;
        inner.detached = Some(commit.to_string());
        inner.operations.push(format!("checkout --detach {commit}"));
        Ok(())
    }

    fn tracked_remote(&self, branch: &str) -> RepoResult<Option<String>> {
        Ok(self.lock().upstreams.get(branch).cloned())
    }

    fn track_remote(&self, branch: &str, remote: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::TrackRemote)?;
        inner
            .upstreams
            .insert(branch.to_string(), remote.to_string());
        inner
            .config
            .insert(format!("branch.{branch}.remote"), remote.to_string());
        inner.operations.push(format!("track {branch} {remote}"));
        Ok(())
    }

    fn has_remote_ref(&self, remote: &str, branch: &str) -> bool {
        self.lock()
            .remote_refs
            .contains(&(remote.to_string(), branch.to_string()))
    }

    fn cherry(&self, base: &str, head: &str) -> RepoResult<Vec<String>> {
        Ok(self
            .lock()
            .cherries
            .get(&(base.to_string(), head.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn remotes(&self) -> RepoResult<BTreeMap<String, String>> {
        Ok(self.lock().remotes.clone())
    }

    fn add_remote(&self, name: &str, url: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::AddRemote)?;
        if inner.remotes.contains_key(name) {
            return Err(FleetError::failed(
                &self.name,
                format!("remote {name} already exists"),
            ));
        }
        inner.remotes.insert(name.to_string(), url.to_string());
        inner.operations.push(format!("remote add {name} {url}"));
        Ok(())
    }

    fn remove_remote(&self, name: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::RemoveRemote)?;
        if inner.remotes.remove(name).is_none() {
            return Err(FleetError::failed(
                &self.name,
                format!("no such remote: '{name}'"),
            ));
        }
        inner.operations.push(format!("remote remove {name}"));
        Ok(())
    }

    fn rename_remote(&self, from: &str, to: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::RenameRemote)?;
        let url = inner
            .remotes
            .remove(from)
            .ok_or_else(|| FleetError::failed(&self.name, format!("no such remote: '{from}'")))?;
        inner.remotes.insert(to.to_string(), url);
        inner.operations.push(format!("remote rename {from} {to}"));
        Ok(())
    }

    fn config_get(&self, key: &str) -> RepoResult<Option<String>> {
        Ok(self.lock().config.get(key).cloned())
    }

    fn config_set(&self, key: &str, value: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::ConfigSet)?;
        inner.config.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn config_unset(&self, key: &str) -> RepoResult<()> {
        self.lock().config.remove(key);
        Ok(())
    }

    fn config_find(&self, prefix: &str) -> RepoResult<BTreeMap<String, String>> {
        Ok(self
            .lock()
            .config
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn read_config(&self) -> RepoResult<Vec<u8>> {
        let inner = self.lock();
        self.guard(&inner, FailOn::ReadConfig)?;
        Ok(render_config(&inner.config))
    }

    fn write_config(&self, bytes: &[u8]) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::WriteConfig)?;
        inner.config = parse_config(bytes);
        inner.upstreams = inner
            .config
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix("branch.")
                    .and_then(|rest| rest.strip_suffix(".remote"))
                    .map(|b| (b.to_string(), v.clone()))
            })
            .collect();
        inner.operations.push("write config".to_string());
        Ok(())
    }

    fn reload_config(&self) {
        self.lock().operations.push("reload config".to_string());
    }

    fn stage(&self, paths: &[&Path]) -> RepoResult<()> {
        let mut inner = self.lock();
        for p in paths {
            inner.operations.push(format!("add {}", p.display()));
        }
        Ok(())
    }

    fn remove_paths(&self, paths: &[&Path]) -> RepoResult<()> {
        let mut inner = self.lock();
        for p in paths {
            let full = self.path.join(p);
            if full.is_dir() {
                fs::remove_dir_all(&full).map_err(|e| io_err(&full, e))?;
            } else if full.exists() {
                fs::remove_file(&full).map_err(|e| io_err(&full, e))?;
            }
            inner.operations.push(format!("rm {}", p.display()));
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        self.guard(&inner, FailOn::Commit)?;
        inner.commits.push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_bytes_roundtrip_restores_upstreams() {
        let repo = MemoryRepo::new("barclamp-nova").with_branch("feature/x/master", "c1");
        let saved = repo.read_config().unwrap();
        repo.track_remote("feature/x/master", "origin").unwrap();
        assert_eq!(
            repo.tracked_remote("feature/x/master").unwrap().as_deref(),
            Some("origin")
        );
        repo.write_config(&saved).unwrap();
        assert_eq!(repo.tracked_remote("feature/x/master").unwrap(), None);
    }

    #[test]
    fn fetch_reports_per_remote_outcome() {
        let repo = MemoryRepo::new("crowbar")
            .with_remote("origin", "https://example.com/crowbar")
            .with_remote("mirror", "https://mirror.example.com/crowbar")
            .with_unreachable_remote("mirror");
        let (ok, outcome) = repo.fetch(&[]);
        assert!(!ok);
        assert_eq!(outcome.get("origin"), Some(&true));
        assert_eq!(outcome.get("mirror"), Some(&false));
    }

    #[test]
    fn cannot_delete_checked_out_branch() {
        let repo = MemoryRepo::new("crowbar");
        assert!(repo.delete_branch("master").is_err());
    }

    #[test]
    fn detached_head_resolves_to_its_commit() {
        let repo = MemoryRepo::new("crowbar").detached_at("abc123");
        assert_eq!(repo.current_branch().unwrap(), None);
        assert_eq!(repo.ref_commit("HEAD").unwrap().as_deref(), Some("abc123"));

        repo.checkout("master").unwrap();
        assert_eq!(repo.ref_commit("HEAD").unwrap().as_deref(), Some("crowbar-root"));
    }
}
