//! Action contract and the concrete upgrade steps.
//!
//! An action is one idempotent unit of work with three hooks:
//! - `prepare` runs in the forward pass (phases `prepare` and `convert`)
//! - `finish` runs in the `finish` pass after the upgrade reboot
//! - `revert` undoes what `prepare` did, where that is possible
//!
//! Running a hook twice must leave the host in the same state as running it
//! once, because an interrupted stage is replayed from its first action.

pub mod apt;
pub mod banner;
pub mod mariadb;
pub mod motd;
pub mod plesk;
pub mod reboot;
pub mod repositories;
pub mod service;
pub mod status;

use anyhow::Result;

use crate::host::Host;
use crate::phase::Phase;

pub use apt::{DoDistupgrade, InstallPackages, UpgradePackages};
pub use banner::DisablePleskSshBanner;
pub use mariadb::{ConfigValueReplacer, ConfigureMariadb, MariadbOption};
pub use motd::{AddFinishSshLoginMessage, AddInProgressSshLoginMessage};
pub use plesk::{RepairPleskInstallation, UpdatePlesk, UpdatePleskExtensions};
pub use reboot::Reboot;
pub use repositories::{RemoveRepositoryBackups, RepositorySource, RewriteRepositories};
pub use service::AddUpgradeSystemdService;
pub use status::HandleConversionStatus;

/// When a requested reboot happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootPoint {
    /// As soon as the stage holding the action is complete.
    AfterCurrentStage,
    /// After every stage of the current pass has run.
    AfterLastStage,
}

/// A reboot an action needs before the run can go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootRequest {
    pub point: RebootPoint,
    /// Phase to persist before rebooting, if the reboot moves the run on.
    pub next_phase: Option<Phase>,
}

/// A single upgrade step.
pub trait Action {
    fn name(&self) -> &str;

    /// One-line summary shown in the plan.
    fn description(&self) -> String {
        self.name().to_string()
    }

    /// Phase this action is limited to. `None` means it takes part in every
    /// phase whose plan contains its stage.
    fn restricted_to_phase(&self) -> Option<Phase> {
        None
    }

    fn prepare(&self, host: &mut dyn Host) -> Result<()>;

    fn finish(&self, _host: &mut dyn Host) -> Result<()> {
        Ok(())
    }

    fn revert(&self, _host: &mut dyn Host) -> Result<()> {
        Ok(())
    }

    /// Reboot needed after running this action in `phase`.
    fn reboot_request(&self, _phase: Phase) -> Option<RebootRequest> {
        None
    }

    fn requires_reboot(&self) -> bool {
        Phase::ALL
            .iter()
            .any(|phase| self.reboot_request(*phase).is_some())
    }

    /// Run the hook that belongs to `phase`.
    fn execute(&self, host: &mut dyn Host, phase: Phase) -> Result<()> {
        if phase.is_forward() {
            self.prepare(host)
        } else {
            self.finish(host)
        }
    }
}

/// Owned handle to an action, as stored in a plan.
pub type BoxedAction = Box<dyn Action>;

/// Options passed to every apt-get call that may touch configuration files:
/// keep locally modified files and take the maintainer default otherwise.
pub(crate) const DPKG_KEEP_CONFIG: [&str; 4] = [
    "-o",
    "Dpkg::Options::=--force-confdef",
    "-o",
    "Dpkg::Options::=--force-confold",
];
