//! The discovered fleet: core repository, module repositories, remotes.
//!
//! # Layout
//!
//! ```text
//! <root>/                 core repository work tree
//!   fleet.yaml            optional settings
//!   modules/<name>/       one module repository each
//!   releases/             release/build metadata
//! ```
//!
//! A [`Fleet`] is built once by the entry point and passed to every
//! operation; nothing is cached process-wide.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{io_err, FleetError};
use crate::git::GitRepo;
use crate::repo::{RepoHandle, RepoSet, Repository};
use crate::settings::{self, Settings};
use crate::types::Remote;

pub const MODULES_DIR: &str = "modules";
pub const RELEASES_DIR: &str = "releases";

/// Core config key naming the checked-out release.
pub const CONFIG_RELEASE: &str = "fleet.release";
/// Core config key naming the checked-out build (`release/build`).
pub const CONFIG_BUILD: &str = "fleet.build";
const REMOTE_PREFIX: &str = "fleet.remote.";

/// Core config key for one remote attribute, e.g. `fleet.remote.origin.urlbase`.
pub fn remote_key(remote: &str, attr: &str) -> String {
    format!("{REMOTE_PREFIX}{remote}.{attr}")
}

/// Everything one fleet invocation operates on.
pub struct Fleet {
    pub root: PathBuf,
    pub core: RepoHandle,
    /// Module repositories keyed by module name.
    pub modules: RepoSet,
    pub remotes: BTreeMap<String, Remote>,
    pub settings: Settings,
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("root", &self.root)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("remotes", &self.remotes)
            .finish()
    }
}

impl Fleet {
    /// Walk upward from `start` until a work tree with a `modules/` directory
    /// is found, then open every module repository beneath it.
    pub fn discover_at(start: &Path) -> Result<Self, FleetError> {
        let start = start
            .canonicalize()
            .map_err(|e| io_err(start, e))?;
        let mut dir: Option<PathBuf> = Some(start.clone());
        while let Some(candidate) = dir.take() {
            if GitRepo::is_bare(&candidate) {
                dir = candidate.parent().map(Path::to_path_buf);
                continue;
            }
            let settings = settings::load_at(&candidate).unwrap_or_default();
            match GitRepo::open(&candidate, settings.core_repo.clone()) {
                Ok(repo) => {
                    let top = repo.path().to_path_buf();
                    if top.join(MODULES_DIR).is_dir() {
                        return Self::open_at(&top, repo);
                    }
                    dir = top.parent().map(Path::to_path_buf);
                }
                Err(_) => dir = candidate.parent().map(Path::to_path_buf),
            }
        }
        Err(FleetError::not_found("fleet", start.display().to_string()))
    }

    fn open_at(root: &Path, core: GitRepo) -> Result<Self, FleetError> {
        let settings = settings::load_at(root)?;
        let modules_dir = root.join(MODULES_DIR);
        let mut entries: Vec<_> = std::fs::read_dir(&modules_dir)
            .map_err(|e| io_err(&modules_dir, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .collect();
        entries.sort_by_key(|e| e.file_name());

        let mut modules = RepoSet::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            // `.git` may be a directory, a gitfile, or a symlink.
            if std::fs::symlink_metadata(path.join(".git")).is_err() {
                continue;
            }
            match GitRepo::open(&path, settings.module_repo_name(&name)) {
                Ok(repo) => {
                    modules.insert(name, Arc::new(repo) as RepoHandle);
                }
                Err(e) => tracing::warn!(module = %name, error = %e, "skipping module"),
            }
        }

        Self::from_parts(root.to_path_buf(), Arc::new(core), modules, settings)
    }

    /// Assemble a fleet from already-open repositories and load its remotes.
    pub fn from_parts(
        root: PathBuf,
        core: RepoHandle,
        modules: RepoSet,
        settings: Settings,
    ) -> Result<Self, FleetError> {
        let remotes = load_remotes(core.as_ref(), settings.default_priority)?;
        Ok(Self {
            root,
            core,
            modules,
            remotes,
            settings,
        })
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join(RELEASES_DIR)
    }

    pub fn module(&self, name: &str) -> Result<&RepoHandle, FleetError> {
        self.modules
            .get(name)
            .ok_or_else(|| FleetError::not_found("module", name))
    }

    /// Module repositories keyed by published name.
    pub fn module_repos(&self) -> RepoSet {
        self.modules
            .values()
            .map(|r| (r.name().to_string(), Arc::clone(r)))
            .collect()
    }

    /// Every repository in the fleet keyed by published name.
    pub fn all_repos(&self) -> RepoSet {
        let mut all = self.module_repos();
        all.insert(self.core.name().to_string(), Arc::clone(&self.core));
        all
    }

    /// Remotes ordered by priority, then name.
    pub fn sorted_remotes(&self) -> Vec<Remote> {
        let mut remotes: Vec<Remote> = self.remotes.values().cloned().collect();
        remotes.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        remotes
    }

    pub fn remote(&self, name: &str) -> Result<&Remote, FleetError> {
        self.remotes
            .get(name)
            .ok_or_else(|| FleetError::not_found("remote", name))
    }

    pub fn current_release_name(&self) -> Result<Option<String>, FleetError> {
        self.core.config_get(CONFIG_RELEASE)
    }

    pub fn current_build_name(&self) -> Result<Option<String>, FleetError> {
        self.core.config_get(CONFIG_BUILD)
    }
}

/// Read `fleet.remote.<name>.{urlbase,priority}` entries from the core config.
///
/// Unparseable priorities keep `default_priority`.
pub fn load_remotes(
    core: &dyn Repository,
    default_priority: u32,
) -> Result<BTreeMap<String, Remote>, FleetError> {
    let mut remotes = BTreeMap::<String, Remote>::new();
    for (key, value) in core.config_find(REMOTE_PREFIX)? {
        let Some(rest) = key.strip_prefix(REMOTE_PREFIX) else {
            continue;
        };
        let Some((name, attr)) = rest.rsplit_once('.') else {
            continue;
        };
        let remote = remotes
            .entry(name.to_string())
            .or_insert_with(|| Remote::new(name, "", default_priority));
        match attr {
            "urlbase" => remote.urlbase = value,
            "priority" => match value.trim().parse() {
                Ok(p) => remote.priority = p,
                Err(_) => tracing::warn!(remote = %name, value = %value, "ignoring bad priority"),
            },
            _ => {}
        }
    }
    Ok(remotes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
