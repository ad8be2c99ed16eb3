//! distup - resumable in-place distribution upgrades for Plesk servers.
//!
//! The upgrade of one host is a fixed, ordered plan of stages. Each stage is
//! a list of idempotent actions. The plan is split into three phases
//! separated by reboots; the current phase and the last completed stage are
//! persisted so an interrupted run continues where it stopped.

pub mod action;
pub mod check;
pub mod config;
pub mod distro;
pub mod error;
pub mod host;
pub mod lock;
pub mod output;
pub mod phase;
pub mod plan;
pub mod registry;
pub mod rewrite;
pub mod runner;
pub mod state;
pub mod upgrader;
pub mod version;

pub use error::DistupError;
pub use phase::Phase;
pub use runner::{RunOutcome, Runner};
pub use upgrader::UpgradeDefinition;
