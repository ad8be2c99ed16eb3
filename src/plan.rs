//! Stage plans.
//!
//! A plan is the ordered list of stages one phase runs. It is built from the
//! full stage table of an upgrade definition by dropping every stage and
//! action whose phase restriction does not admit the phase.

use crate::action::{Action, BoxedAction};
use crate::phase::Phase;

/// Named, ordered group of actions.
pub struct Stage {
    pub name: String,
    pub restricted_to_phase: Option<Phase>,
    pub actions: Vec<BoxedAction>,
}

impl Stage {
    pub fn new(name: impl Into<String>, actions: Vec<BoxedAction>) -> Self {
        Self {
            name: name.into(),
            restricted_to_phase: None,
            actions,
        }
    }

    /// A stage that only belongs to plans of phases admitting `phase`.
    pub fn restricted(name: impl Into<String>, phase: Phase, actions: Vec<BoxedAction>) -> Self {
        Self {
            restricted_to_phase: Some(phase),
            ..Self::new(name, actions)
        }
    }

    pub fn action_names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    pub fn requires_reboot(&self) -> bool {
        self.actions.iter().any(|a| a.requires_reboot())
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("restricted_to_phase", &self.restricted_to_phase)
            .field("actions", &self.action_names())
            .finish()
    }
}

/// The stages of one phase, in execution order.
#[derive(Debug)]
pub struct Plan {
    phase: Phase,
    stages: Vec<Stage>,
}

impl Plan {
    /// Filter `table` down to what `phase` runs. Stages left without any
    /// action are dropped.
    pub fn for_phase(phase: Phase, table: Vec<Stage>) -> Self {
        let stages = table
            .into_iter()
            .filter(|stage| phase.admits(stage.restricted_to_phase))
            .filter_map(|mut stage| {
                stage
                    .actions
                    .retain(|action| phase.admits(action.restricted_to_phase()));
                (!stage.actions.is_empty()).then_some(stage)
            })
            .collect();
        Self { phase, stages }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
