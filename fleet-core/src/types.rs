//! Domain types shared by every fleet crate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Remotes
// ---------------------------------------------------------------------------

/// Priority assigned to a remote when none is configured.
pub const DEFAULT_PRIORITY: u32 = 50;

/// A named, prioritised upstream origin template applied to every repository.
///
/// The URL of the remote inside one repository is `<urlbase>/<repo name>`.
/// Lower `priority` values win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub urlbase: String,
    pub priority: u32,
}

impl Remote {
    pub fn new(name: impl Into<String>, urlbase: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            urlbase: urlbase.into(),
            priority,
        }
    }

    /// Remote URL for the repository published as `repo_name`.
    pub fn url_for(&self, repo_name: &str) -> String {
        format!("{}/{}", self.urlbase.trim_end_matches('/'), repo_name)
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: urlbase={}, priority={}",
            self.name, self.urlbase, self.priority
        )
    }
}

// ---------------------------------------------------------------------------
// Repository probe results
// ---------------------------------------------------------------------------

/// Per-remote success flags from one fetch.
pub type FetchOutcome = BTreeMap<String, bool>;

/// One line of `git status --porcelain` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Two-character index/worktree status code, e.g. `" M"` or `"??"`.
    pub code: String,
    pub path: String,
}

impl StatusLine {
    pub fn new(code: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            path: path.into(),
        }
    }

    /// Parse a porcelain v1 line. Returns `None` for blank or truncated lines.
    pub fn parse(line: &str) -> Option<Self> {
        if line.len() < 4 || !line.is_char_boundary(2) {
            return None;
        }
        let (code, rest) = line.split_at(2);
        Some(Self::new(code, rest.trim_start()))
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
