//! The version-control capability the rest of fleet is written against.
//!
//! Everything fleet does to a repository goes through [`Repository`]. Two
//! backends exist: [`crate::git::GitRepo`] shells out to `git`, and
//! [`crate::memory::MemoryRepo`] keeps all state in memory for tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::FleetError;
use crate::types::{FetchOutcome, StatusLine};

/// Shared handle to one repository. Handles are never copied, only shared.
pub type RepoHandle = Arc<dyn Repository>;

/// A named set of repositories; each name is visited at most once per batch.
pub type RepoSet = BTreeMap<String, RepoHandle>;

pub type RepoResult<T> = Result<T, FleetError>;

/// Git-level operations consumed by the orchestrator, remotes and releases.
///
/// Implementations must be usable from several threads at once, but fleet
/// never runs two operations against the same repository concurrently.
pub trait Repository: Send + Sync {
    /// Name this repository is published under, e.g. `barclamp-nova`.
    fn name(&self) -> &str;

    /// Root of the work tree.
    fn path(&self) -> &Path;

    // -- network ------------------------------------------------------------

    /// Fetch from each named remote (all remotes when `remotes` is empty).
    /// The flag is the overall outcome.
    fn fetch(&self, remotes: &[String]) -> (bool, FetchOutcome);

    /// Whether a repository exists at `url`.
    fn probe_url(&self, url: &str) -> bool;

    // -- work tree ----------------------------------------------------------

    /// Dirty status lines; an empty list means clean.
    fn status(&self) -> RepoResult<Vec<StatusLine>>;

    // -- refs ---------------------------------------------------------------

    /// Commit id a ref name resolves to, or `None` when it does not exist.
    fn ref_commit(&self, name: &str) -> RepoResult<Option<String>>;

    /// Whether `name` is a local branch.
    fn is_local_branch(&self, name: &str) -> bool;

    /// Branch HEAD points at, `None` when detached.
    fn current_branch(&self) -> RepoResult<Option<String>>;

    /// Every local branch with the commit id it points at.
    fn branches(&self) -> RepoResult<Vec<(String, String)>>;

    fn create_branch(&self, name: &str, commit: &str) -> RepoResult<()>;

    /// Point `name` at `commit`, creating it if needed. Moving the checked-out
    /// branch also resets the work tree.
    fn force_branch(&self, name: &str, commit: &str) -> RepoResult<()>;

    /// Force-delete a local branch.
    fn delete_branch(&self, name: &str) -> RepoResult<()>;

    fn checkout(&self, branch: &str) -> RepoResult<()>;

    /// Detach HEAD at `commit`.
    fn checkout_detached(&self, commit: &str) -> RepoResult<()>;

    /// Remote the branch tracks, if any.
    fn tracked_remote(&self, branch: &str) -> RepoResult<Option<String>>;

    /// Make `branch` track `<remote>/<branch>`.
    fn track_remote(&self, branch: &str, remote: &str) -> RepoResult<()>;

    fn has_remote_ref(&self, remote: &str, branch: &str) -> bool;

    /// One-line summaries of commits in `head` that are not in `base`.
    fn cherry(&self, base: &str, head: &str) -> RepoResult<Vec<String>>;

    // -- remotes ------------------------------------------------------------

    /// Remote name to fetch URL.
    fn remotes(&self) -> RepoResult<BTreeMap<String, String>>;

    fn has_remote(&self, name: &str) -> bool {
        self.remotes()
            .map(|r| r.contains_key(name))
            .unwrap_or(false)
    }

    fn add_remote(&self, name: &str, url: &str) -> RepoResult<()>;

    fn remove_remote(&self, name: &str) -> RepoResult<()>;

    fn rename_remote(&self, from: &str, to: &str) -> RepoResult<()>;

    // -- config -------------------------------------------------------------

    fn config_get(&self, key: &str) -> RepoResult<Option<String>>;

    fn config_set(&self, key: &str, value: &str) -> RepoResult<()>;

    fn config_unset(&self, key: &str) -> RepoResult<()>;

    /// Every `key = value` pair whose key starts with `prefix`.
    fn config_find(&self, prefix: &str) -> RepoResult<BTreeMap<String, String>>;

    /// Raw bytes of the repository's config store.
    fn read_config(&self) -> RepoResult<Vec<u8>>;

    /// Overwrite the config store with `bytes`.
    fn write_config(&self, bytes: &[u8]) -> RepoResult<()>;

    /// Drop any cached config so the next read sees the store on disk.
    fn reload_config(&self);

    // -- metadata commits ---------------------------------------------------

    /// Stage paths (relative to the work tree) for the next commit.
    fn stage(&self, paths: &[&Path]) -> RepoResult<()>;

    /// Remove paths recursively from the index and work tree.
    fn remove_paths(&self, paths: &[&Path]) -> RepoResult<()>;

    fn commit(&self, message: &str) -> RepoResult<()>;
}
