//! Switching the fleet's work trees to a build.

use std::sync::Arc;

use fleet_batch::{branch_checkpoint, BatchReport, Orchestrator, ResultToken};
use fleet_core::{Fleet, FleetError, RepoSet, CONFIG_BUILD, CONFIG_RELEASE};

use crate::error::ReleaseError;
use crate::model::{bind, Hierarchy, ModuleBranches};
use crate::naming::MASTER_BUILD;
use crate::store;

/// Work out the full build name a `switch` argument refers to.
///
/// - nothing: the current build
/// - a release name: the build of that release named like the current build,
///   falling back to its master build
/// - `release/build`: that build
pub fn switch_target(
    fleet: &Fleet,
    hierarchy: &Hierarchy,
    target: Option<&str>,
) -> Result<String, ReleaseError> {
    let current = hierarchy.current_build(fleet)?;
    let Some(target) = target else {
        return current
            .map(|b| b.full_name())
            .ok_or_else(|| FleetError::not_found("build", "<current>").into());
    };

    if let Some(release) = hierarchy.releases.get(target) {
        let candidates = current
            .map(|b| b.name.as_str())
            .into_iter()
            .chain(std::iter::once(MASTER_BUILD));
        for name in candidates {
            if let Some(build) = release.builds.get(name) {
                return Ok(build.full_name());
            }
        }
        return Err(FleetError::not_found("build", format!("{target}/{MASTER_BUILD}")).into());
    }

    hierarchy
        .build(target)
        .map(|b| b.full_name())
        .map_err(|_| FleetError::not_found("switch target", target).into())
}

/// Check out every module of `full_name` on its bound branch.
///
/// Each repository is branch-checkpointed first, so one failed checkout puts
/// every repository back where it was. On success the current release and
/// build are recorded and the build's `change-image`/`extra` links are
/// installed in the core work tree. Results carry the branch each switched
/// repository was on before.
pub async fn switch_build(
    fleet: &Fleet,
    orch: &Orchestrator,
    hierarchy: &Hierarchy,
    full_name: &str,
) -> Result<BatchReport<Option<String>>, ReleaseError> {
    let build = hierarchy.build(full_name)?;
    let modules: Arc<ModuleBranches> = Arc::new(hierarchy.build_modules(build)?);
    let repos: RepoSet = bind(fleet, &modules)?
        .into_iter()
        .map(|b| (b.module, b.repo))
        .collect();

    let report = orch
        .run(
            &repos,
            move |module, repo| {
                let mut token = ResultToken::<Option<String>>::new(module);
                let Some(branch) = modules.get(module) else {
                    token.fail("module not bound by this build");
                    return token;
                };
                match branch_checkpoint(repo) {
                    Ok(cp) => token.set_checkpoint(cp),
                    Err(e) => {
                        token.fail(e);
                        return token;
                    }
                }
                let previous = repo.current_branch().ok().flatten();
                if previous.as_deref() == Some(branch.as_str()) {
                    return token;
                }
                match repo.checkout(branch) {
                    Ok(()) => token.with_results(previous),
                    Err(e) => {
                        token.fail(e);
                        token
                    }
                }
            },
            |token| match (&token.results, token.ok) {
                (Some(prev), true) => tracing::info!(module = %token.name, from = %prev, "switched"),
                (_, false) => tracing::warn!(module = %token.name, error = ?token.error, "switch failed"),
                _ => {}
            },
        )
        .await?
        .into_result()?;

    fleet.core.config_set(CONFIG_RELEASE, &build.release)?;
    fleet.core.config_set(CONFIG_BUILD, full_name)?;
    let build_dir = store::build_dir_at(&fleet.releases_dir(), &build.release, &build.name);
    store::link_build_extras_at(&fleet.root, &build_dir)?;
    tracing::info!(build = %full_name, "switched");
    Ok(report)
}
