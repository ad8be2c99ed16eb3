//! Pre-flight checks.
//!
//! A check inspects the host through a [`HostProbe`] and reports pass or
//! fail. Checks cannot change the system: the probe has no mutating methods.
//! Any probe error counts as a failure.

pub mod plesk;
pub mod system;

use tracing::{debug, info};

use crate::host::HostProbe;

pub use plesk::{AssertMinPhpVersion, AssertMinPleskVersion, AssertPleskInstallerNotInProgress};
pub use system::{AssertDpkgNotLocked, AssertNotInContainer};

/// A read-only condition that must hold before any mutation happens.
pub trait CheckAction {
    fn name(&self) -> &str;

    /// Human explanation shown when the check fails.
    fn description(&self) -> String;

    fn evaluate(&self, probe: &dyn HostProbe) -> bool;
}

pub type BoxedCheck = Box<dyn CheckAction>;

/// The first check that did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheck {
    pub name: String,
    pub description: String,
}

/// Status of a single evaluated check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub description: String,
}

/// Evaluate `checks` in order and stop at the first failure.
pub fn run_checks(checks: &[BoxedCheck], probe: &dyn HostProbe) -> Result<(), FailedCheck> {
    for check in checks {
        if !check.evaluate(probe) {
            return Err(FailedCheck {
                name: check.name().to_string(),
                description: check.description(),
            });
        }
        debug!("Check passed: {}", check.name());
    }
    info!("All {} pre-flight checks passed", checks.len());
    Ok(())
}

/// Evaluate every check without stopping, for reporting.
pub fn evaluate_all(checks: &[BoxedCheck], probe: &dyn HostProbe) -> Vec<CheckResult> {
    checks
        .iter()
        .map(|check| CheckResult {
            name: check.name().to_string(),
            status: if check.evaluate(probe) {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            },
            description: check.description(),
        })
        .collect()
}
