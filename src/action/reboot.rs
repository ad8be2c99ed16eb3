//! Reboot steps.
//!
//! A reboot action itself does nothing to the host. It only declares a
//! [`RebootRequest`]; the runner persists progress and issues the reboot.

use anyhow::Result;

use super::{Action, RebootPoint, RebootRequest};
use crate::host::Host;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// Reboot into the new kernel during the forward pass.
    Intermediate,
    /// End the forward pass and come back up in `finish`.
    ToFinish,
    /// Last reboot once the finish pass is done.
    Final,
}

pub struct Reboot {
    name: String,
    kind: Kind,
}

impl Reboot {
    /// Forward-pass reboot; the run continues with the next stage of the
    /// same phase.
    pub fn new() -> Self {
        Self {
            name: "Reboot".to_string(),
            kind: Kind::Intermediate,
        }
    }

    /// Reboot that ends the forward pass and moves the run to `finish`.
    pub fn to_finish(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Kind::ToFinish,
        }
    }

    /// Reboot after the finish pass. Nothing changes phase.
    pub fn final_reboot(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Kind::Final,
        }
    }
}

impl Default for Reboot {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for Reboot {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        match self.kind {
            Kind::Intermediate => "Reboot the server".to_string(),
            Kind::ToFinish => "Reboot the server and continue with finishing actions".to_string(),
            Kind::Final => "Reboot the server after finishing actions".to_string(),
        }
    }

    fn prepare(&self, _host: &mut dyn Host) -> Result<()> {
        Ok(())
    }

    fn reboot_request(&self, phase: Phase) -> Option<RebootRequest> {
        match (self.kind, phase.is_forward()) {
            (Kind::Intermediate, true) => Some(RebootRequest {
                point: RebootPoint::AfterCurrentStage,
                next_phase: None,
            }),
            (Kind::ToFinish, true) => Some(RebootRequest {
                point: RebootPoint::AfterCurrentStage,
                next_phase: Some(Phase::Finish),
            }),
            (Kind::Final, false) => Some(RebootRequest {
                point: RebootPoint::AfterLastStage,
                next_phase: None,
            }),
            _ => None,
        }
    }
}
