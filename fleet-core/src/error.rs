//! Error types for fleet-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which half of a batch's second phase was running when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Commit,
    Rollback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Commit => write!(f, "commit"),
            Phase::Rollback => write!(f, "rollback"),
        }
    }
}

/// All errors that can arise from fleet operations.
///
/// `Validation`, `NotFound` and `Conflict` are raised before anything is
/// mutated. `Inconsistent` means repositories were left in mutually
/// inconsistent states; it must only be handled at the process boundary.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Bad name, URL, or priority shape.
    #[error("invalid {what}: {detail}")]
    Validation { what: &'static str, detail: String },

    /// Unknown release, build, remote, module, or repository.
    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: &'static str, name: String },

    /// Duplicate name or pre-existing target.
    #[error("{0}")]
    Conflict(String),

    /// The branch a module binding points at is missing from its repository.
    #[error("base branch '{branch}' of module '{module}' in release '{release}' does not exist")]
    BaseRefMissing {
        module: String,
        branch: String,
        release: String,
    },

    /// A branch that is about to be created already exists.
    #[error("module '{module}' already has a branch named '{branch}'")]
    BranchAlreadyExists { module: String, branch: String },

    /// An underlying version-control command failed.
    #[error("{repo}: {detail}")]
    OperationFailed { repo: String, detail: String },

    /// A commit or rollback pass partially failed.
    #[error("unable to {phase} all batch operations; inconsistent repositories: {}", repos.join(", "))]
    Inconsistent { phase: Phase, repos: Vec<String> },

    /// Filesystem failure, with the path that triggered it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `fleet.yaml` exists but could not be parsed.
    #[error("failed to parse settings at {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl FleetError {
    pub fn validation(what: &'static str, detail: impl Into<String>) -> Self {
        FleetError::Validation {
            what,
            detail: detail.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        FleetError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn failed(repo: impl Into<String>, detail: impl Into<String>) -> Self {
        FleetError::OperationFailed {
            repo: repo.into(),
            detail: detail.into(),
        }
    }

    /// True for the one variant that must never be caught and continued.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FleetError::Inconsistent { .. })
    }
}

/// Convenience constructor for [`FleetError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> FleetError {
    FleetError::Io {
        path: path.into(),
        source,
    }
}
