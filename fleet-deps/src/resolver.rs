//! Dependency resolution over module declarations.
//!
//! Resolution runs in four passes:
//!
//! 1. supersede: a module declaring it supersedes `B` removes `B`
//! 2. groups: `@group` requirements become the sorted group members
//! 3. per-module dependency lists, memoized, every module implicitly
//!    requiring the root module
//! 4. the global order: fewest dependencies first, then by name
//!
//! A module's dependency list is built from one chain per direct requirement
//! (`deps(r) + [r]`), bucketed by chain length. Ranks are walked in ascending
//! order and chains within a rank by their last element; the first time a
//! name is seen fixes its position. Chains are never reordered internally, so
//! every dependency lands before the modules that need it.

use std::collections::{BTreeMap, BTreeSet};

use crate::declaration::{ModuleDeclaration, GROUP_PREFIX};
use crate::error::ResolveError;

/// Output of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Every surviving module, fewest dependencies first, ties by name.
    pub order: Vec<String>,
    /// Ordered transitive dependencies of each module.
    pub deps: BTreeMap<String, Vec<String>>,
}

impl Resolution {
    pub fn deps_of(&self, module: &str) -> Option<&[String]> {
        self.deps.get(module).map(Vec::as_slice)
    }
}

/// Resolve `decls` with `root` as the module everything else depends on.
pub fn resolve(decls: &[ModuleDeclaration], root: &str) -> Result<Resolution, ResolveError> {
    let survivors = apply_supersedes(decls);
    let requires = expand_groups(&survivors)?;
    if !requires.contains_key(root) {
        return Err(ResolveError::MissingRoot(root.to_string()));
    }

    let mut walker = Walker {
        root,
        requires: &requires,
        memo: BTreeMap::new(),
        in_progress: Vec::new(),
    };
    for name in requires.keys() {
        walker.deps_of(name)?;
    }
    let deps = walker.memo;

    let mut order: Vec<String> = deps.keys().cloned().collect();
    order.sort_by(|a, b| deps[a].len().cmp(&deps[b].len()).then_with(|| a.cmp(b)));

    Ok(Resolution { order, deps })
}

fn apply_supersedes(decls: &[ModuleDeclaration]) -> BTreeMap<&str, &ModuleDeclaration> {
    let mut by_name: BTreeMap<&str, &ModuleDeclaration> = BTreeMap::new();
    for decl in decls {
        if by_name.insert(decl.name.as_str(), decl).is_some() {
            tracing::warn!(module = %decl.name, "duplicate declaration, last one wins");
        }
    }

    let victims: BTreeSet<&str> = by_name
        .values()
        .flat_map(|d| {
            d.supersedes.iter().map(move |victim| {
                tracing::info!(module = %d.name, superseded = %victim, "supersedes");
                victim.as_str()
            })
        })
        .collect();
    by_name.retain(|name, _| !victims.contains(name));
    by_name
}

fn expand_groups(
    decls: &BTreeMap<&str, &ModuleDeclaration>,
) -> Result<BTreeMap<String, Vec<String>>, ResolveError> {
    let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (name, decl) in decls {
        for group in &decl.members {
            groups.entry(group.as_str()).or_default().insert(*name);
        }
    }

    let mut requires = BTreeMap::new();
    for (name, decl) in decls {
        let mut expanded = Vec::with_capacity(decl.requires.len());
        for req in &decl.requires {
            match req.strip_prefix(GROUP_PREFIX) {
                Some(group) => {
                    let members = groups.get(group).ok_or_else(|| ResolveError::UnknownGroup {
                        group: group.to_string(),
                        required_by: name.to_string(),
                    })?;
                    expanded.extend(members.iter().map(|m| m.to_string()));
                }
                None => expanded.push(req.clone()),
            }
        }
        expanded.sort();
        expanded.dedup();
        requires.insert(name.to_string(), expanded);
    }
    Ok(requires)
}

struct Walker<'a> {
    root: &'a str,
    requires: &'a BTreeMap<String, Vec<String>>,
    memo: BTreeMap<String, Vec<String>>,
    in_progress: Vec<String>,
}

impl Walker<'_> {
    fn deps_of(&mut self, module: &str) -> Result<Vec<String>, ResolveError> {
        if let Some(done) = self.memo.get(module) {
            return Ok(done.clone());
        }
        if module == self.root {
            self.memo.insert(module.to_string(), Vec::new());
            return Ok(Vec::new());
        }
        if self.in_progress.iter().any(|m| m == module) {
            return Err(ResolveError::CircularDependency {
                module: module.to_string(),
            });
        }
        self.in_progress.push(module.to_string());

        let mut ranks: BTreeMap<usize, Vec<Vec<String>>> = BTreeMap::new();
        ranks.insert(1, vec![vec![self.root.to_string()]]);

        let direct = self.requires.get(module).cloned().unwrap_or_default();
        for req in direct {
            if !self.requires.contains_key(&req) {
                return Err(ResolveError::UnknownModule {
                    module: req,
                    required_by: module.to_string(),
                });
            }
            let mut chain = self.deps_of(&req)?;
            chain.push(req);
            if chain.iter().any(|m| m == module) {
                return Err(ResolveError::CircularDependency {
                    module: module.to_string(),
                });
            }
            ranks.entry(chain.len()).or_default().push(chain);
        }

        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        for (_, mut chains) in ranks {
            // Sort whole chains by their terminal module rather than sorting the
            // merged names: a flat name sort within a rank could place a
            // dependency after the module that requires it.
            chains.sort_by(|a, b| a.last().cmp(&b.last()));
            for dep in chains.into_iter().flatten() {
                if seen.insert(dep.clone()) {
                    ordered.push(dep);
                }
            }
        }

        self.in_progress.pop();
        self.memo.insert(module.to_string(), ordered.clone());
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_alone_has_no_dependencies() {
        let res = resolve(&[ModuleDeclaration::new("crowbar")], "crowbar").unwrap();
        assert_eq!(res.order, vec!["crowbar"]);
        assert_eq!(res.deps_of("crowbar"), Some(&[][..]));
    }

    #[test]
    fn chain_order_survives_rank_bucketing() {
        let decls = [
            ModuleDeclaration::new("crowbar"),
            ModuleDeclaration::new("z"),
            ModuleDeclaration::new("a").requires(["z"]),
            ModuleDeclaration::new("m").requires(["a"]),
        ];
        let res = resolve(&decls, "crowbar").unwrap();
        assert_eq!(res.deps_of("m").unwrap(), ["crowbar", "z", "a"]);
    }

    #[test]
    fn self_requirement_is_circular() {
        let decls = [
            ModuleDeclaration::new("crowbar"),
            ModuleDeclaration::new("nova").requires(["nova"]),
        ];
        assert!(matches!(
            resolve(&decls, "crowbar"),
            Err(ResolveError::CircularDependency { module }) if module == "nova"
        ));
    }
}
