//! Custom error types for distup.

use std::path::PathBuf;

use thiserror::Error;

use crate::phase::Phase;

/// Errors that can occur while planning or driving a distribution upgrade.
#[derive(Error, Debug)]
pub enum DistupError {
    #[error("[{phase}] Preflight check failed: {check}: {description}")]
    PreflightFailed {
        phase: Phase,
        check: String,
        description: String,
        /// Raised by a run that continued persisted progress.
        resumed: bool,
    },

    #[error("[{phase}] Action '{action}' in stage '{stage}' failed: {reason}")]
    ActionFailed {
        phase: Phase,
        stage: String,
        action: String,
        reason: String,
    },

    #[error("Phase cannot move backwards from {from} to {to}")]
    PhaseRegression { from: Phase, to: Phase },

    #[error("Phase {0} is terminal and cannot be advanced")]
    TerminalPhase(Phase),

    #[error("Unsupported system: {0}")]
    UnsupportedSystem(String),

    #[error("Unsupported state schema version {found} (supported: {supported})")]
    StateSchema { found: u32, supported: u32 },

    #[error("State file error: {0}")]
    State(String),

    #[error("Revert not possible: {0}")]
    RevertNotPossible(String),

    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Another distup run is in progress (lock held on {})", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("Operation cancelled by user")]
    UserCancelled,
}

impl DistupError {
    /// Returns true if the error was raised before anything on the host was
    /// changed, so the run can simply be started again. A failed check in a
    /// resumed run does not qualify: earlier stages already ran.
    pub const fn is_host_untouched(&self) -> bool {
        matches!(
            self,
            Self::PreflightFailed { resumed: false, .. }
                | Self::AlreadyRunning(_)
                | Self::UnsupportedSystem(_)
                | Self::StateSchema { .. }
                | Self::UserCancelled
        )
    }
}
