//! Upgrade lifecycle phases and the durable phase state machine.
//!
//! The run moves strictly forward: `prepare` -> `convert` -> `finish`. Every
//! transition is persisted through a [`StateStore`] before it is reported, so
//! a host restarted at any point resumes at the recorded phase.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::UpgradeOptions;
use crate::error::DistupError;
use crate::state::{RunState, StateStore};

/// Phase of the upgrade lifecycle.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Pre-flight setup and repository retargeting.
    Prepare,
    /// Package-level dist-upgrade.
    Convert,
    /// Post-reboot cleanup and final reboot.
    Finish,
}

impl Phase {
    pub const ALL: [Self; 3] = [Self::Prepare, Self::Convert, Self::Finish];

    /// The phase that follows this one, if any.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Prepare => Some(Self::Convert),
            Self::Convert => Some(Self::Finish),
            Self::Finish => None,
        }
    }

    /// Whether content restricted to `restriction` is part of the plan for
    /// this phase.
    ///
    /// `Convert` content belongs to the whole forward pass, which starts in
    /// `Prepare`; `Finish` content only to the finish pass.
    pub fn admits(self, restriction: Option<Self>) -> bool {
        match restriction {
            None => true,
            Some(Self::Prepare) => self == Self::Prepare,
            Some(Self::Convert) => self != Self::Finish,
            Some(Self::Finish) => self == Self::Finish,
        }
    }

    /// True for the phases that run the forward (`prepare`) hooks of actions.
    pub fn is_forward(self) -> bool {
        self != Self::Finish
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prepare => write!(f, "prepare"),
            Self::Convert => write!(f, "convert"),
            Self::Finish => write!(f, "finish"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = DistupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prepare" => Ok(Self::Prepare),
            "convert" => Ok(Self::Convert),
            "finish" => Ok(Self::Finish),
            other => Err(DistupError::State(format!("unknown phase '{other}'"))),
        }
    }
}

/// Durable phase state machine.
///
/// Holds the in-memory copy of the run state and writes it to the store on
/// every mutation.
pub struct PhaseMachine<S: StateStore> {
    store: S,
    state: RunState,
}

impl<S: StateStore> PhaseMachine<S> {
    /// Load the persisted run state, or start a fresh run at `prepare` with
    /// the given options snapshot.
    pub fn open(store: S, upgrader: &str, options: &UpgradeOptions) -> Result<Self> {
        let state = match store.load()? {
            Some(state) => {
                if state.upgrader != upgrader {
                    return Err(DistupError::State(format!(
                        "state belongs to upgrader '{}', not '{upgrader}'",
                        state.upgrader
                    ))
                    .into());
                }
                info!(
                    "Resuming {} at phase {} (last completed stage: {})",
                    state.upgrader,
                    state.phase,
                    state.last_completed_stage.as_deref().unwrap_or("none")
                );
                state
            }
            None => {
                let state = RunState::new(upgrader, options.clone());
                store.save(&state)?;
                info!("Starting new {} run at phase {}", upgrader, state.phase);
                state
            }
        };
        Ok(Self { store, state })
    }

    pub fn current_phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn options(&self) -> &UpgradeOptions {
        &self.state.options
    }

    pub fn last_completed_stage(&self) -> Option<&str> {
        self.state.last_completed_stage.as_deref()
    }

    /// Advance exactly one step from `from`, which must be the current phase.
    pub fn advance(&mut self, from: Phase) -> Result<Phase> {
        if from != self.state.phase {
            return Err(DistupError::State(format!(
                "cannot advance from {from}: current phase is {}",
                self.state.phase
            ))
            .into());
        }
        let next = from.next().ok_or(DistupError::TerminalPhase(from))?;
        self.transition_to(next)
    }

    /// Move forward to `target`. Moving to the current phase is a no-op;
    /// moving backwards is rejected.
    pub fn transition_to(&mut self, target: Phase) -> Result<Phase> {
        let current = self.state.phase;
        if target < current {
            return Err(DistupError::PhaseRegression {
                from: current,
                to: target,
            }
            .into());
        }
        if target == current {
            return Ok(current);
        }
        self.state.phase = target;
        self.state.last_completed_stage = None;
        self.persist()?;
        info!("Phase transition: {} -> {}", current, target);
        Ok(target)
    }

    /// Record `stage` as the last fully completed stage of the current phase.
    pub fn mark_stage_completed(&mut self, stage: &str) -> Result<()> {
        self.state.last_completed_stage = Some(stage.to_string());
        self.persist()
    }

    /// Record that the finish pass ran to its end.
    pub fn mark_completed(&mut self) -> Result<()> {
        self.state.completed = true;
        self.persist()
    }

    /// Drop the persisted state entirely. Used by revert.
    pub fn reset(self) -> Result<()> {
        self.store.clear()
    }

    fn persist(&mut self) -> Result<()> {
        self.state.updated_at = Utc::now();
        self.store.save(&self.state)
    }
}
