//! The release/build forest and module resolution over it.

use std::collections::{BTreeMap, BTreeSet};

use fleet_batch::BranchMap;
use fleet_core::{Fleet, FleetError, RepoHandle};

use crate::error::ReleaseError;
use crate::naming::{release_branch, split_build_name, MASTER_BUILD};

/// Module name to branch name.
pub type ModuleBranches = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A named deliverable within a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub name: String,
    pub release: String,
    /// Parent build in the same release; `None` for the master build.
    pub parent: Option<String>,
    /// This build's own bindings, not including inherited ones.
    pub modules: ModuleBranches,
}

impl Build {
    /// `<release>/<build>`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.release, self.name)
    }
}

/// A named development stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub parent: Option<String>,
    pub builds: BTreeMap<String, Build>,
}

impl Release {
    pub fn branch(&self) -> Result<String, FleetError> {
        release_branch(&self.name)
    }

    pub fn build(&self, name: &str) -> Result<&Build, FleetError> {
        self.builds
            .get(name)
            .ok_or_else(|| FleetError::not_found("build", format!("{}/{name}", self.name)))
    }
}

/// A module bound to a branch, with the repository that holds it.
#[derive(Clone)]
pub struct ModuleBinding {
    pub module: String,
    pub branch: String,
    pub repo: RepoHandle,
}

impl std::fmt::Debug for ModuleBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBinding")
            .field("module", &self.module)
            .field("branch", &self.branch)
            .field("repo", &self.repo.name())
            .finish()
    }
}

/// Attach repositories to `modules`. Every module must exist in the fleet.
pub fn bind(fleet: &Fleet, modules: &ModuleBranches) -> Result<Vec<ModuleBinding>, FleetError> {
    modules
        .iter()
        .map(|(module, branch)| {
            Ok(ModuleBinding {
                module: module.clone(),
                branch: branch.clone(),
                repo: fleet.module(module)?.clone(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// Every release known to the metadata store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    pub releases: BTreeMap<String, Release>,
}

impl Hierarchy {
    pub fn release(&self, name: &str) -> Result<&Release, FleetError> {
        self.releases
            .get(name)
            .ok_or_else(|| FleetError::not_found("release", name))
    }

    /// Look up a build by its full `release/build` name.
    pub fn build(&self, full_name: &str) -> Result<&Build, FleetError> {
        let (release, build) = split_build_name(full_name)
            .ok_or_else(|| FleetError::not_found("build", full_name))?;
        self.releases
            .get(release)
            .and_then(|r| r.builds.get(build))
            .ok_or_else(|| FleetError::not_found("build", full_name))
    }

    /// Every build of every release, sorted by full name.
    pub fn all_builds(&self) -> impl Iterator<Item = &Build> {
        self.releases.values().flat_map(|r| r.builds.values())
    }

    /// Releases whose parent is `name`.
    pub fn child_releases(&self, name: &str) -> Vec<&Release> {
        self.releases
            .values()
            .filter(|r| r.parent.as_deref() == Some(name))
            .collect()
    }

    /// Builds whose parent is `build`, within the same release.
    pub fn child_builds(&self, build: &Build) -> Vec<&Build> {
        self.releases
            .get(&build.release)
            .map(|r| {
                r.builds
                    .values()
                    .filter(|b| b.parent.as_deref() == Some(build.name.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Own bindings merged over the parent build's resolved bindings; own
    /// entries win.
    pub fn build_modules(&self, build: &Build) -> Result<ModuleBranches, ReleaseError> {
        let release = self.release(&build.release)?;
        let mut lineage = vec![build];
        let mut seen = BTreeSet::from([build.name.as_str()]);
        let mut current = build;
        while let Some(parent) = current.parent.as_deref() {
            if !seen.insert(parent) {
                return Err(ReleaseError::metadata(
                    &build.full_name(),
                    format!("build parents loop back to '{parent}'"),
                ));
            }
            current = release.builds.get(parent).ok_or_else(|| {
                ReleaseError::metadata(
                    &current.full_name(),
                    format!("parent build '{parent}' does not exist"),
                )
            })?;
            lineage.push(current);
        }

        let mut resolved = ModuleBranches::new();
        for b in lineage.into_iter().rev() {
            resolved.extend(b.modules.iter().map(|(m, br)| (m.clone(), br.clone())));
        }
        Ok(resolved)
    }

    /// Union of every build's bindings in the release.
    ///
    /// When builds disagree on a module's branch the master build's binding
    /// is kept; between other builds the first by name wins. Either way the
    /// collision is logged.
    pub fn release_modules(&self, name: &str) -> Result<ModuleBranches, FleetError> {
        let release = self.release(name)?;
        let builds = release
            .builds
            .get(MASTER_BUILD)
            .into_iter()
            .chain(release.builds.values().filter(|b| b.name != MASTER_BUILD));

        let mut resolved = ModuleBranches::new();
        for build in builds {
            for (module, branch) in &build.modules {
                match resolved.get(module) {
                    Some(kept) if kept != branch => tracing::warn!(
                        release = %name,
                        module = %module,
                        kept = %kept,
                        ignored = %branch,
                        build = %build.name,
                        "builds bind module to different branches"
                    ),
                    Some(_) => {}
                    None => {
                        resolved.insert(module.clone(), branch.clone());
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// Every branch any build binds each module to.
    pub fn module_branches(&self) -> BranchMap {
        let mut map = BranchMap::new();
        for build in self.all_builds() {
            for (module, branch) in &build.modules {
                map.entry(module.clone()).or_default().push(branch.clone());
            }
        }
        for branches in map.values_mut() {
            branches.sort();
            branches.dedup();
        }
        map
    }

    /// The release recorded in the core config, if any.
    pub fn current_release(&self, fleet: &Fleet) -> Result<Option<&Release>, FleetError> {
        match fleet.current_release_name()? {
            Some(name) => self.release(&name).map(Some),
            None => Ok(None),
        }
    }

    /// The build recorded in the core config, if any.
    pub fn current_build(&self, fleet: &Fleet) -> Result<Option<&Build>, FleetError> {
        match fleet.current_build_name()? {
            Some(name) => self.build(&name).map(Some),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn build(release: &str, name: &str, parent: Option<&str>, modules: &[(&str, &str)]) -> Build {
        Build {
            name: name.to_string(),
            release: release.to_string(),
            parent: parent.map(str::to_string),
            modules: modules
                .iter()
                .map(|(m, b)| (m.to_string(), b.to_string()))
                .collect(),
        }
    }

    fn hierarchy(builds: Vec<Build>) -> Hierarchy {
        let mut h = Hierarchy::default();
        for b in builds {
            h.releases
                .entry(b.release.clone())
                .or_insert_with(|| Release {
                    name: b.release.clone(),
                    parent: None,
                    builds: BTreeMap::new(),
                })
                .builds
                .insert(b.name.clone(), b);
        }
        h
    }

    #[test]
    fn child_build_inherits_parent_bindings() {
        let h = hierarchy(vec![
            build("grizzly", "master", None, &[("a", "branchA")]),
            build("grizzly", "openstack", Some("master"), &[("b", "branchB")]),
        ]);
        let b2 = h.build("grizzly/openstack").unwrap();
        let resolved = h.build_modules(b2).unwrap();
        assert_eq!(
            resolved,
            ModuleBranches::from([
                ("a".to_string(), "branchA".to_string()),
                ("b".to_string(), "branchB".to_string()),
            ])
        );
    }

    #[test]
    fn own_binding_wins_over_inherited() {
        let h = hierarchy(vec![
            build("grizzly", "master", None, &[("a", "branchA")]),
            build("grizzly", "openstack", Some("master"), &[("a", "branchA2"), ("b", "branchB")]),
        ]);
        let resolved = h.build_modules(h.build("grizzly/openstack").unwrap()).unwrap();
        assert_eq!(resolved["a"], "branchA2");
        assert_eq!(resolved["b"], "branchB");
    }

    #[test]
    fn parent_loop_is_reported() {
        let h = hierarchy(vec![
            build("grizzly", "x", Some("y"), &[]),
            build("grizzly", "y", Some("x"), &[]),
        ]);
        assert!(matches!(
            h.build_modules(h.build("grizzly/x").unwrap()),
            Err(ReleaseError::Metadata { .. })
        ));
    }

    #[test]
    fn module_branches_collects_every_build() {
        let h = hierarchy(vec![
            build("development", "master", None, &[("nova", "master")]),
            build("grizzly", "master", None, &[("nova", "release/grizzly/master")]),
            build("grizzly", "extra", Some("master"), &[("nova", "master")]),
        ]);
        assert_eq!(
            h.module_branches()["nova"],
            vec!["master".to_string(), "release/grizzly/master".to_string()]
        );
    }

    #[test]
    fn release_modules_prefer_the_master_binding() {
        let h = hierarchy(vec![
            build("grizzly", "master", None, &[("nova", "release/grizzly/master")]),
            build("grizzly", "zeta", Some("master"), &[("nova", "feature/z"), ("swift", "master")]),
        ]);
        let modules = h.release_modules("grizzly").unwrap();
        assert_eq!(modules["nova"], "release/grizzly/master");
        assert_eq!(modules["swift"], "master");
    }

    #[test]
    fn namespaced_build_lookup() {
        let h = hierarchy(vec![build("feature/x", "master", None, &[])]);
        assert!(h.build("feature/x/master").is_ok());
        assert!(matches!(
            h.build("feature/x/other"),
            Err(FleetError::NotFound { kind: "build", .. })
        ));
    }
}
