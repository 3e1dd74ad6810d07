//! Module declarations and the `module.yml` files they are read from.
//!
//! ```yaml
//! module:
//!   name: nova
//!   version: 2
//!   member: [openstack]
//!   requires: [keystone, "@database"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

pub const MODULE_FILE: &str = "module.yml";

/// Prefix marking a requirement as a group reference.
pub const GROUP_PREFIX: char = '@';

/// What one module says about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDeclaration {
    pub name: String,
    pub version: Option<u32>,
    /// Groups this module belongs to.
    #[serde(alias = "member")]
    pub members: Vec<String>,
    /// Modules this one replaces; their declarations are discarded.
    #[serde(alias = "supercedes")]
    pub supersedes: Vec<String>,
    /// Module names, or `@group` references.
    pub requires: Vec<String>,
}

impl ModuleDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn member_of(mut self, group: impl Into<String>) -> Self {
        self.members.push(group.into());
        self
    }

    pub fn supersedes(mut self, module: impl Into<String>) -> Self {
        self.supersedes.push(module.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct ModuleFile {
    module: Option<ModuleDeclaration>,
}

/// `<dir>/module.yml` when `path` is a directory, otherwise `path` itself.
pub fn module_file_at(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(MODULE_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Load the declaration in the `module:` section of one metadata file.
pub fn load_declaration_at(path: &Path) -> Result<ModuleDeclaration, ResolveError> {
    let path = module_file_at(path);
    let contents = fs::read_to_string(&path).map_err(|source| ResolveError::Io {
        path: path.clone(),
        source,
    })?;
    let file: ModuleFile = serde_yaml::from_str(&contents).map_err(|source| ResolveError::Parse {
        path: path.clone(),
        source,
    })?;
    match file.module {
        Some(decl) if !decl.name.is_empty() => Ok(decl),
        _ => Err(ResolveError::NotAModule { path }),
    }
}

/// Load every path; the first failure aborts.
pub fn load_declarations<P: AsRef<Path>>(
    paths: &[P],
) -> Result<Vec<ModuleDeclaration>, ResolveError> {
    paths
        .iter()
        .map(|p| load_declaration_at(p.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_module_section_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MODULE_FILE),
            "module:\n  name: nova\n  version: 2\n  member: [openstack]\n  supercedes: [oldnova]\n  requires: [keystone, \"@database\"]\nextra_files: []\n",
        )
        .unwrap();

        let decl = load_declaration_at(dir.path()).unwrap();
        assert_eq!(decl.name, "nova");
        assert_eq!(decl.version, Some(2));
        assert_eq!(decl.members, vec!["openstack"]);
        assert_eq!(decl.supersedes, vec!["oldnova"]);
        assert_eq!(decl.requires, vec!["keystone", "@database"]);
    }

    #[test]
    fn file_without_module_section_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.yml");
        fs::write(&path, "debs:\n  pkgs: [curl]\n").unwrap();
        assert!(matches!(
            load_declaration_at(&path),
            Err(ResolveError::NotAModule { .. })
        ));
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.yml");
        fs::write(&path, "module: [unterminated\n").unwrap();
        match load_declaration_at(&path) {
            Err(ResolveError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
