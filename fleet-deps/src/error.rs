use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading module metadata or resolving dependencies.
///
/// Every variant aborts the whole resolution; no partial ordering is ever
/// returned.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("module '{module}' depends on itself")]
    CircularDependency { module: String },

    #[error("module '{required_by}' requires '{module}', which does not exist")]
    UnknownModule { module: String, required_by: String },

    #[error("module '{required_by}' requires group '@{group}', which does not exist")]
    UnknownGroup { group: String, required_by: String },

    #[error("root module '{0}' is not declared")]
    MissingRoot(String),

    #[error("{path} has no module section")]
    NotAModule { path: PathBuf },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
