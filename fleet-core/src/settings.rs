//! Optional `fleet.yaml` settings at the fleet root.
//!
//! Every key is optional; a missing file yields [`Settings::default`].
//!
//! ```yaml
//! root_module: crowbar
//! max_workers: 8
//! task_timeout_secs: 300
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, FleetError};
use crate::types::DEFAULT_PRIORITY;

pub const SETTINGS_FILE: &str = "fleet.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Module every other module implicitly requires.
    pub root_module: String,
    /// Name the core repository is published under.
    pub core_repo: String,
    /// Prefix turning a module name into its published repository name.
    pub module_repo_prefix: String,
    /// Upper bound on concurrently running per-repository tasks.
    pub max_workers: usize,
    /// Per-task timeout in seconds; `0` disables it.
    pub task_timeout_secs: u64,
    pub default_priority: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_module: "crowbar".to_string(),
            core_repo: "crowbar".to_string(),
            module_repo_prefix: "barclamp-".to_string(),
            max_workers: 16,
            task_timeout_secs: 600,
            default_priority: DEFAULT_PRIORITY,
        }
    }
}

impl Settings {
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }

    /// Published repository name of `module`, e.g. `barclamp-nova`.
    pub fn module_repo_name(&self, module: &str) -> String {
        format!("{}{}", self.module_repo_prefix, module)
    }
}

/// `<root>/fleet.yaml`: pure, no I/O.
pub fn settings_path_at(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

/// Load `<root>/fleet.yaml`, falling back to defaults when it is absent.
pub fn load_at(root: &Path) -> Result<Settings, FleetError> {
    let path = settings_path_at(root);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|source| FleetError::Settings { path, source })?;
    if settings.max_workers == 0 {
        return Err(FleetError::validation("settings", "max_workers must be at least 1"));
    }
    Ok(settings)
}
