//! Release and build management for fleet.
//!
//! Releases form a forest; each owns a tree of builds; each build binds
//! modules to branches and inherits its parent build's bindings. The forest
//! is stored as flat files under `<root>/releases` ([`store`]) and changed
//! through the batch orchestrator so repositories never end up half-switched
//! or half-branched.

pub mod changes;
pub mod error;
pub mod model;
pub mod naming;
pub mod remove;
pub mod split;
pub mod store;
pub mod switch;

pub use changes::{cross_release_changes, local_changes, remote_changes, ChangeSet};
pub use error::ReleaseError;
pub use model::{bind, Build, Hierarchy, ModuleBinding, ModuleBranches, Release};
pub use naming::{release_branch, DEVELOPMENT, MASTER_BUILD};
pub use remove::{remove_build, remove_release};
pub use split::split_release;
pub use switch::{switch_build, switch_target};

use fleet_core::Fleet;

/// Load the release forest of `fleet`.
pub fn load(fleet: &Fleet) -> Result<Hierarchy, ReleaseError> {
    store::load_at(&fleet.releases_dir())
}
