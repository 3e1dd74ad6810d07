//! Transactional batch operations over every repository of a fleet.
//!
//! - [`token`]: per-repository [`ResultToken`]s and their commit/rollback pair
//! - [`checkpoint`]: config and branch checkpoint strategies
//! - [`orchestrator`]: the bounded parallel map-reduce with two-phase settle
//! - [`ops`]: fetch, clean check, tracking-branch recomputation
//! - [`remotes`]: the fleet-wide remote registry

pub mod checkpoint;
pub mod ops;
pub mod orchestrator;
pub mod remotes;
pub mod token;

pub use checkpoint::{branch_checkpoint, config_checkpoint};
pub use ops::{check_clean, fetch_all, retrack, BranchMap, Retracked};
pub use orchestrator::{BatchReport, Orchestrator};
pub use token::{Checkpoint, Completion, ResultToken, TokenReport};
