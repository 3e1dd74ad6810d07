//! Fleet core library: domain types, errors, the repository capability and
//! the discovered fleet context.
//!
//! - [`types`]: remotes and probe results
//! - [`error`]: [`FleetError`]
//! - [`repo`]: the [`Repository`] trait
//! - [`git`] / [`memory`]: repository backends
//! - [`settings`] / [`context`]: `fleet.yaml` and [`Fleet`]

pub mod context;
pub mod error;
pub mod git;
pub mod memory;
pub mod repo;
pub mod settings;
pub mod types;

pub use context::{Fleet, CONFIG_BUILD, CONFIG_RELEASE};
pub use error::{FleetError, Phase};
pub use repo::{RepoHandle, RepoResult, RepoSet, Repository};
pub use settings::Settings;
pub use types::{FetchOutcome, Remote, StatusLine, DEFAULT_PRIORITY};
