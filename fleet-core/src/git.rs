//! [`Repository`] backed by the `git` command line.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{io_err, FleetError};
use crate::repo::{RepoResult, Repository};
use crate::types::{FetchOutcome, StatusLine};

/// A git work tree driven through `git -C <path> …`.
#[derive(Debug, Clone)]
pub struct GitRepo {
    name: String,
    workdir: PathBuf,
    config_path: PathBuf,
}

impl GitRepo {
    /// Open the work tree containing `path`, publishing it as `name`.
    ///
    /// Fails with `NotFound` when `path` is not inside a non-bare work tree.
    pub fn open(path: &Path, name: impl Into<String>) -> RepoResult<Self> {
        let name = name.into();
        let top = run_in(path, &["rev-parse", "--show-toplevel"])
            .ok()
            .filter(|o| o.status.success())
            .ok_or_else(|| FleetError::not_found("git work tree", path.display().to_string()))?;
        let workdir = PathBuf::from(stdout_of(&top).trim());

        let common = run_in(&workdir, &["rev-parse", "--git-common-dir"])
            .map_err(|e| io_err(&workdir, e))?;
        if !common.status.success() {
            return Err(FleetError::failed(&name, stderr_of(&common)));
        }
        let common = PathBuf::from(stdout_of(&common).trim());
        let git_dir = if common.is_absolute() {
            common
        } else {
            workdir.join(common)
        };

        Ok(Self {
            name,
            config_path: git_dir.join("config"),
            workdir,
        })
    }

    /// Whether `path` is inside a bare repository (or a `.git` directory).
    pub fn is_bare(path: &Path) -> bool {
        run_in(path, &["rev-parse", "--is-bare-repository", "--is-inside-git-dir"])
            .map(|o| o.status.success() && stdout_of(&o).lines().any(|l| l.trim() == "true"))
            .unwrap_or(false)
    }

    fn git(&self, args: &[&str]) -> RepoResult<Output> {
        tracing::debug!(repo = %self.name, "git {}", args.join(" "));
        run_in(&self.workdir, args).map_err(|e| io_err(&self.workdir, e))
    }

    /// Run git and fail unless it exits zero; returns stdout.
    fn git_ok(&self, args: &[&str]) -> RepoResult<String> {
        let out = self.git(args)?;
        if !out.status.success() {
            return Err(FleetError::failed(
                &self.name,
                format!("git {} failed: {}", args.join(" "), stderr_of(&out)),
            ));
        }
        Ok(stdout_of(&out))
    }

    /// Run git and report only whether it exited zero.
    fn git_quiet(&self, args: &[&str]) -> bool {
        self.git(args).map(|o| o.status.success()).unwrap_or(false)
    }
}

impl Repository for GitRepo {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.workdir
    }

    fn fetch(&self, remotes: &[String]) -> (bool, FetchOutcome) {
        let targets: Vec<String> = if remotes.is_empty() {
            match self.remotes() {
                Ok(all) => all.into_keys().collect(),
                Err(e) => {
                    tracing::warn!(repo = %self.name, error = %e, "could not list remotes");
                    return (false, FetchOutcome::new());
                }
            }
        } else {
            remotes.to_vec()
        };

        let mut outcome = FetchOutcome::new();
        for remote in targets {
            let ok = self.git_quiet(&["fetch", "--quiet", &remote]);
            outcome.insert(remote, ok);
        }
        (outcome.values().all(|ok| *ok), outcome)
    }

    fn probe_url(&self, url: &str) -> bool {
        self.git_quiet(&["ls-remote", "--heads", url])
    }

    fn status(&self) -> RepoResult<Vec<StatusLine>> {
        let out = self.git_ok(&["status", "--porcelain"])?;
        Ok(out.lines().filter_map(StatusLine::parse).collect())
    }

    fn ref_commit(&self, name: &str) -> RepoResult<Option<String>> {
        let spec = format!("{name}^{{commit}}");
        let out = self.git(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(stdout_of(&out).trim().to_string()))
    }

    fn is_local_branch(&self, name: &str) -> bool {
        let full = format!("refs/heads/{name}");
        self.git_quiet(&["show-ref", "--verify", "--quiet", &full])
    }

    fn current_branch(&self) -> RepoResult<Option<String>> {
        let out = self.git(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(stdout_of(&out).trim().to_string()))
    }

    fn branches(&self) -> RepoResult<Vec<(String, String)>> {
        let out = self.git_ok(&[
            "for-each-ref",
            "--format=%(refname:short) %(objectname)",
            "refs/heads",
        ])?;
        Ok(out
            .lines()
            .filter_map(|line| line.split_once(' '))
            .map(|(name, sha)| (name.to_string(), sha.trim().to_string()))
            .collect())
    }

    fn create_branch(&self, name: &str, commit: &str) -> RepoResult<()> {
        self.git_ok(&["branch", name, commit]).map(drop)
    }

    fn force_branch(&self, name: &str, commit: &str) -> RepoResult<()> {
        if self.current_branch()?.as_deref() == Some(name) {
            self.git_ok(&["reset", "--hard", "--quiet", commit]).map(drop)
        } else {
            self.git_ok(&["branch", "-f", name, commit]).map(drop)
        }
    }

    fn delete_branch(&self, name: &str) -> RepoResult<()> {
        self.git_ok(&["branch", "-D", name]).map(drop)
    }

    fn checkout(&self, branch: &str) -> RepoResult<()> {
        self.git_ok(&["checkout", "--quiet", branch]).map(drop)
    }

    fn checkout_detached(&self, commit: &str) -> RepoResult<()> {
        self.git_ok(&["checkout", "--quiet", "--detach", commit]).map(drop)
    }

    fn tracked_remote(&self, branch: &str) -> RepoResult<Option<String>> {
        self.config_get(&format!("branch.{branch}.remote"))
    }

    fn track_remote(&self, branch: &str, remote: &str) -> RepoResult<()> {
        let upstream = format!("--set-upstream-to={remote}/{branch}");
        self.git_ok(&["branch", "--quiet", &upstream, branch]).map(drop)
    }

    fn has_remote_ref(&self, remote: &str, branch: &str) -> bool {
        let full = format!("refs/remotes/{remote}/{branch}");
        self.git_quiet(&["show-ref", "--verify", "--quiet", &full])
    }

    fn cherry(&self, base: &str, head: &str) -> RepoResult<Vec<String>> {
        let out = self.git_ok(&["cherry", "-v", base, head])?;
        Ok(out
            .lines()
            .filter_map(|l| l.strip_prefix("+ "))
            .map(str::to_string)
            .collect())
    }

    fn remotes(&self) -> RepoResult<BTreeMap<String, String>> {
        let urls = self.config_find("remote.")?;
        Ok(urls
            .into_iter()
            .filter_map(|(key, url)| {
                key.strip_prefix("remote.")
                    .and_then(|rest| rest.strip_suffix(".url"))
                    .map(|name| (name.to_string(), url))
            })
            .collect())
    }

    fn add_remote(&self, name: &str, url: &str) -> RepoResult<()> {
        self.git_ok(&["remote", "add", name, url]).map(drop)
    }

    fn remove_remote(&self, name: &str) -> RepoResult<()> {
        self.git_ok(&["remote", "remove", name]).map(drop)
    }

    fn rename_remote(&self, from: &str, to: &str) -> RepoResult<()> {
        self.git_ok(&["remote", "rename", from, to]).map(drop)
    }

    fn config_get(&self, key: &str) -> RepoResult<Option<String>> {
        let out = self.git(&["config", "--get", key])?;
        match out.status.code() {
            Some(0) => Ok(Some(stdout_of(&out).trim().to_string())),
            Some(1) => Ok(None),
            _ => Err(FleetError::failed(&self.name, stderr_of(&out))),
        }
    }

    fn config_set(&self, key: &str, value: &str) -> RepoResult<()> {
        self.git_ok(&["config", key, value]).map(drop)
    }

    fn config_unset(&self, key: &str) -> RepoResult<()> {
        let out = self.git(&["config", "--unset", key])?;
        // 5: key was not set
        match out.status.code() {
            Some(0) | Some(5) => Ok(()),
            _ => Err(FleetError::failed(&self.name, stderr_of(&out))),
        }
    }

    fn config_find(&self, prefix: &str) -> RepoResult<BTreeMap<String, String>> {
        let pattern = format!("^{}", prefix.replace('.', "\\."));
        let out = self.git(&["config", "--get-regexp", &pattern])?;
        if out.status.code() == Some(1) {
            return Ok(BTreeMap::new());
        }
        if !out.status.success() {
            return Err(FleetError::failed(&self.name, stderr_of(&out)));
        }
        Ok(stdout_of(&out)
            .lines()
            .map(|line| match line.split_once(' ') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (line.to_string(), String::new()),
            })
            .collect())
    }

    fn read_config(&self) -> RepoResult<Vec<u8>> {
        let meta = fs::metadata(&self.config_path).map_err(|e| io_err(&self.config_path, e))?;
        if !meta.is_file() {
            return Err(FleetError::failed(
                &self.name,
                format!("{} is not a regular file", self.config_path.display()),
            ));
        }
        fs::read(&self.config_path).map_err(|e| io_err(&self.config_path, e))
    }

    fn write_config(&self, bytes: &[u8]) -> RepoResult<()> {
        fs::write(&self.config_path, bytes).map_err(|e| io_err(&self.config_path, e))
    }

    fn reload_config(&self) {
        // Every git invocation re-reads the config file; nothing is cached.
    }

    fn stage(&self, paths: &[&Path]) -> RepoResult<()> {
        let mut args = vec!["add", "--"];
        let rendered: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        args.extend(rendered.iter().map(String::as_str));
        self.git_ok(&args).map(drop)
    }

    fn remove_paths(&self, paths: &[&Path]) -> RepoResult<()> {
        let mut args = vec!["rm", "-r", "-q", "--ignore-unmatch", "--"];
        let rendered: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        args.extend(rendered.iter().map(String::as_str));
        self.git_ok(&args)?;
        for p in paths {
            let full = self.workdir.join(p);
            if full.exists() {
                fs::remove_dir_all(&full).map_err(|e| io_err(&full, e))?;
            }
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> RepoResult<()> {
        self.git_ok(&["commit", "--quiet", "-m", message]).map(drop)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn run_in(dir: &Path, args: &[&str]) -> std::io::Result<Output> {
    Command::new("git").arg("-C").arg(dir).args(args).output()
}

fn stdout_of(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr_of(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
