use std::path::PathBuf;

use fleet_core::FleetError;
use thiserror::Error;

/// Errors from release and build management.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error("cannot remove '{0}': it is the current release")]
    ActiveRelease(String),

    #[error("release '{0}' cannot be removed")]
    ProtectedRelease(String),

    #[error("cannot remove '{0}': it is the master build of its release")]
    MasterBuild(String),

    #[error("cannot remove build '{build}' while it has children: {}", children.join(", "))]
    HasChildren { build: String, children: Vec<String> },

    #[error("bad release metadata at {path}: {detail}")]
    Metadata { path: PathBuf, detail: String },
}

impl ReleaseError {
    pub fn metadata(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        ReleaseError::Metadata {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// The wrapped [`FleetError::Inconsistent`], if that is what this is.
    pub fn inconsistent(&self) -> Option<&FleetError> {
        match self {
            ReleaseError::Fleet(e) if e.is_fatal() => Some(e),
            _ => None,
        }
    }
}
