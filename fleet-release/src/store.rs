//! Flat on-disk release metadata.
//!
//! ```text
//! releases/
//!   development/
//!     master/
//!       module-nova          branch name, whitespace trimmed
//!     openstack/
//!       parent -> ../master  symlink or file naming the parent build
//!       module-swift
//!   grizzly/
//!     parent                 names the parent release
//!     master/ ...
//!   feature/<name>/ ...      namespaced releases
//!   local/<name>/ ...
//! ```
//!
//! All functions take the `releases/` directory explicitly. Writes go
//! through a temporary file and a rename; committing the change is left to
//! the caller.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use fleet_core::error::io_err;

use crate::error::ReleaseError;
use crate::model::{Build, Hierarchy, ModuleBranches, Release};
use crate::naming::NAMESPACES;

pub const PARENT_FILE: &str = "parent";
pub const MODULE_PREFIX: &str = "module-";

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<releases>/<release>`: pure, no I/O.
pub fn release_dir_at(releases: &Path, release: &str) -> PathBuf {
    release.split('/').fold(releases.to_path_buf(), |p, part| p.join(part))
}

/// `<releases>/<release>/<build>`: pure, no I/O.
pub fn build_dir_at(releases: &Path, release: &str, build: &str) -> PathBuf {
    release_dir_at(releases, release).join(build)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read the whole release forest under `releases`.
pub fn load_at(releases: &Path) -> Result<Hierarchy, ReleaseError> {
    let meta = fs::symlink_metadata(releases).map_err(|e| io_err(releases, e))?;
    if !meta.is_dir() {
        return Err(ReleaseError::metadata(releases, "not a directory"));
    }
    if releases.join(".git").exists() {
        return Err(ReleaseError::metadata(
            releases,
            "is a repository of its own, not flat metadata",
        ));
    }

    let mut hierarchy = Hierarchy::default();
    for top in subdirs(releases)? {
        if NAMESPACES.contains(&top.as_str()) {
            for inner in subdirs(&releases.join(&top))? {
                let name = format!("{top}/{inner}");
                hierarchy.releases.insert(name.clone(), load_release_at(releases, &name)?);
            }
        } else {
            hierarchy.releases.insert(top.clone(), load_release_at(releases, &top)?);
        }
    }
    tracing::debug!(releases = hierarchy.releases.len(), "loaded release metadata");
    Ok(hierarchy)
}

/// Read one release and its builds.
pub fn load_release_at(releases: &Path, name: &str) -> Result<Release, ReleaseError> {
    let dir = release_dir_at(releases, name);
    let parent = read_trimmed(&dir.join(PARENT_FILE))?;
    let mut builds = BTreeMap::new();
    for build in subdirs(&dir)? {
        let loaded = load_build_at(&dir, name, &build)?;
        builds.insert(build, loaded);
    }
    Ok(Release {
        name: name.to_string(),
        parent,
        builds,
    })
}

fn load_build_at(release_dir: &Path, release: &str, name: &str) -> Result<Build, ReleaseError> {
    let dir = release_dir.join(name);
    let parent_path = dir.join(PARENT_FILE);
    let parent = match fs::symlink_metadata(&parent_path) {
        Ok(m) if m.file_type().is_symlink() => {
            let target = fs::read_link(&parent_path).map_err(|e| io_err(&parent_path, e))?;
            target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        }
        Ok(_) => read_trimmed(&parent_path)?
            .map(|p| p.rsplit('/').next().unwrap_or_default().to_string()),
        Err(_) => None,
    };

    let mut modules = ModuleBranches::new();
    let entries = fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(&dir, e))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(module) = file_name.strip_prefix(MODULE_PREFIX) else {
            continue;
        };
        match read_trimmed(&entry.path())? {
            Some(branch) => {
                modules.insert(module.to_string(), branch);
            }
            None => tracing::warn!(path = %entry.path().display(), "empty module binding"),
        }
    }

    Ok(Build {
        name: name.to_string(),
        release: release.to_string(),
        parent,
        modules,
    })
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Point `release` at a new parent, or make it a root with `None`.
///
/// Returns the path that changed, relative to `releases`.
pub fn set_release_parent_at(
    releases: &Path,
    release: &str,
    parent: Option<&str>,
) -> Result<PathBuf, ReleaseError> {
    let path = release_dir_at(releases, release).join(PARENT_FILE);
    match parent {
        Some(parent) => write_atomic(&path, parent)?,
        None => match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&path, e).into()),
        },
    }
    Ok(release_dir_at(Path::new(""), release))
}

/// Copy the metadata tree of `from` to a new release `to`, rebinding every
/// module to `branch` and making `from` the parent.
pub fn clone_release_at(
    releases: &Path,
    from: &str,
    to: &str,
    branch: &str,
) -> Result<(), ReleaseError> {
    let src = release_dir_at(releases, from);
    let dest = release_dir_at(releases, to);
    if dest.exists() {
        return Err(ReleaseError::metadata(&dest, "already exists"));
    }
    copy_tree(&src, &dest, branch)?;
    set_release_parent_at(releases, to, Some(from))?;
    Ok(())
}

fn copy_tree(src: &Path, dest: &Path, branch: &str) -> Result<(), ReleaseError> {
    fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
    for entry in fs::read_dir(src).map_err(|e| io_err(src, e))? {
        let entry = entry.map_err(|e| io_err(src, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let kind = entry.file_type().map_err(|e| io_err(&from, e))?;

        if kind.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| io_err(&from, e))?;
            symlink(&target, &to)?;
        } else if kind.is_dir() {
            copy_tree(&from, &to, branch)?;
        } else if entry
            .file_name()
            .to_string_lossy()
            .starts_with(MODULE_PREFIX)
        {
            write_atomic(&to, branch)?;
        } else {
            fs::copy(&from, &to).map_err(|e| io_err(&from, e))?;
        }
    }
    Ok(())
}

/// Replace the `change-image` and `extra` links in the core work tree with
/// links into `build_dir`, for whichever of them the build provides.
pub fn link_build_extras_at(root: &Path, build_dir: &Path) -> Result<Vec<PathBuf>, ReleaseError> {
    let mut linked = Vec::new();
    for name in ["change-image", "extra"] {
        let link = root.join(name);
        if let Ok(meta) = fs::symlink_metadata(&link) {
            if !meta.file_type().is_symlink() {
                tracing::warn!(path = %link.display(), "not a symlink, leaving it alone");
                continue;
            }
            fs::remove_file(&link).map_err(|e| io_err(&link, e))?;
        }
        let target = build_dir.join(name);
        if target.exists() {
            symlink(&target, &link)?;
            linked.push(link);
        }
    }
    Ok(linked)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn subdirs(dir: &Path) -> Result<Vec<String>, ReleaseError> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

/// Trimmed contents of a regular file; `None` when missing or blank.
fn read_trimmed(path: &Path) -> Result<Option<String>, ReleaseError> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let trimmed = contents.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

fn write_atomic(path: &Path, content: &str) -> Result<(), ReleaseError> {
    let tmp = PathBuf::from(format!("{}.fleet.tmp", path.display()));
    fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(path, e).into());
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<(), ReleaseError> {
    std::os::unix::fs::symlink(target, link).map_err(|e| io_err(link, e).into())
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> Result<(), ReleaseError> {
    Err(ReleaseError::metadata(
        link,
        format!("cannot link to {} on this platform", target.display()),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        tmp.child("development/master/module-nova").write_str("master\n").unwrap();
        tmp.child("development/master/module-swift").write_str("master").unwrap();
        tmp.child("development/openstack/module-keystone").write_str("master").unwrap();
        tmp.child("development/openstack/parent").symlink_to_dir(tmp.child("development/master").path()).unwrap();
        tmp.child("grizzly/parent").write_str("development\n").unwrap();
        tmp.child("grizzly/master/module-nova").write_str("release/grizzly/master").unwrap();
        tmp.child("feature/ha/master/module-nova").write_str("feature/ha/master").unwrap();
        tmp.child("feature/ha/parent").write_str("grizzly").unwrap();
        tmp
    }

    #[test]
    fn loads_releases_builds_and_namespaces() {
        let tmp = fixture();
        let h = load_at(tmp.path()).unwrap();
        let names: Vec<&str> = h.releases.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["development", "feature/ha", "grizzly"]);
        assert_eq!(h.release("grizzly").unwrap().parent.as_deref(), Some("development"));

        let openstack = h.build("development/openstack").unwrap();
        assert_eq!(openstack.parent.as_deref(), Some("master"));
        assert_eq!(openstack.modules["keystone"], "master");

        let master = h.build("development/master").unwrap();
        assert_eq!(master.parent, None);
        assert_eq!(master.modules["nova"], "master");
    }

    #[test]
    fn missing_releases_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(load_at(&tmp.path().join("releases")).is_err());
    }

    #[test]
    fn clone_rewrites_bindings_and_sets_parent() {
        let tmp = fixture();
        clone_release_at(tmp.path(), "development", "havana", "release/havana/master").unwrap();

        tmp.child("havana/master/module-nova").assert("release/havana/master");
        tmp.child("havana/openstack/module-keystone").assert("release/havana/master");
        tmp.child("havana/parent").assert("development");
        let link = tmp.child("havana/openstack/parent");
        assert!(fs::symlink_metadata(link.path()).unwrap().file_type().is_symlink());

        let h = load_at(tmp.path()).unwrap();
        let havana = h.release("havana").unwrap();
        assert_eq!(havana.builds.len(), 2);
        assert_eq!(havana.parent.as_deref(), Some("development"));
    }

    #[test]
    fn clone_onto_existing_release_fails() {
        let tmp = fixture();
        assert!(matches!(
            clone_release_at(tmp.path(), "development", "grizzly", "release/grizzly/master"),
            Err(ReleaseError::Metadata { .. })
        ));
    }

    #[test]
    fn clearing_parent_removes_file() {
        let tmp = fixture();
        let changed = set_release_parent_at(tmp.path(), "grizzly", None).unwrap();
        assert_eq!(changed, PathBuf::from("grizzly"));
        tmp.child("grizzly/parent").assert(predicates::path::missing());
        set_release_parent_at(tmp.path(), "grizzly", None).unwrap();
    }

    #[test]
    fn extras_are_relinked_when_present() {
        let tmp = fixture();
        let root = tmp.child("core");
        root.create_dir_all().unwrap();
        let build = tmp.child("development/master");
        build.child("extra").create_dir_all().unwrap();
        root.child("change-image").symlink_to_dir(tmp.path()).unwrap();

        let linked = link_build_extras_at(root.path(), build.path()).unwrap();
        assert_eq!(linked, vec![root.path().join("extra")]);
        root.child("change-image").assert(predicates::path::missing());
        assert_eq!(fs::read_link(root.path().join("extra")).unwrap(), build.path().join("extra"));
    }
}
