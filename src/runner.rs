//! Upgrade driver.
//!
//! Runs the plan of the persisted phase stage by stage. Progress is written to
//! the state store before every reboot, so the resume service picks up right
//! after the last completed stage.

use anyhow::{Error, Result};
use tracing::{debug, error, info, warn};

use crate::action::{Action, RebootPoint, RebootRequest};
use crate::check::run_checks;
use crate::config::UpgradeOptions;
use crate::error::DistupError;
use crate::host::Host;
use crate::phase::{Phase, PhaseMachine};
use crate::plan::{Plan, Stage};
use crate::state::{CompletionRecord, StateStore};
use crate::upgrader::{STAGE_PREPARE, UpgradeDefinition};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A reboot was issued after `stage`; the next invocation continues in
    /// `phase`.
    Rebooting { phase: Phase, stage: String },
    /// The finish pass ran to its end. `rebooting` is set when the final
    /// reboot was issued.
    Completed { rebooting: bool },
    /// The persisted state says the upgrade is already done. Nothing ran.
    AlreadyCompleted,
}

enum PassOutcome {
    Done(RunOutcome),
    /// The forward pass ended without handing over through a reboot.
    NextPhase,
}

pub struct Runner<'a, S: StateStore> {
    definition: &'a UpgradeDefinition,
    store: S,
    options: UpgradeOptions,
    host: &'a mut dyn Host,
}

impl<'a, S: StateStore> Runner<'a, S> {
    /// `options` are used for a fresh run only; a run in progress keeps the
    /// snapshot it was started with.
    pub fn new(
        definition: &'a UpgradeDefinition,
        store: S,
        options: UpgradeOptions,
        host: &'a mut dyn Host,
    ) -> Self {
        Self {
            definition,
            store,
            options,
            host,
        }
    }

    /// Run from the persisted position until a reboot is issued or the
    /// upgrade completes.
    ///
    /// Pre-flight checks for the phase run before anything is written, so a
    /// failed check leaves both the host and the state store as they were.
    pub fn run(self) -> Result<RunOutcome> {
        let existing = self.store.load()?;
        if existing.as_ref().is_some_and(|state| state.completed) {
            info!("Upgrade has already been completed, nothing to do");
            return Ok(RunOutcome::AlreadyCompleted);
        }
        let phase = existing.as_ref().map_or(Phase::Prepare, |state| state.phase);
        self.preflight(phase, existing.is_some())?;

        let Self {
            definition,
            store,
            options,
            host,
        } = self;
        let machine = PhaseMachine::open(store, &definition.name, &options)?;
        let mut driver = Driver {
            definition,
            machine,
            host,
        };
        loop {
            match driver.run_pass()? {
                PassOutcome::Done(outcome) => return Ok(outcome),
                PassOutcome::NextPhase => {
                    let next = driver.machine.current_phase();
                    let checks = definition.check_actions(driver.machine.options(), next);
                    run_checks(&checks, &*driver.host).map_err(|failed| {
                        DistupError::PreflightFailed {
                            phase: next,
                            check: failed.name,
                            description: failed.description,
                            resumed: true,
                        }
                    })?;
                }
            }
        }
    }

    /// Undo the prepare stage and drop the state. Only possible while the
    /// run has not left the prepare phase.
    pub fn revert(mut self) -> Result<()> {
        let existing = self.store.load()?;
        let options = match &existing {
            Some(state) if state.phase != Phase::Prepare => {
                return Err(DistupError::RevertNotPossible(format!(
                    "the upgrade is already in the {} phase",
                    state.phase
                ))
                .into());
            }
            Some(state) => state.options.clone(),
            None => {
                warn!("No upgrade in progress, reverting prepare actions anyway");
                self.options.clone()
            }
        };

        let plan = self.definition.build_plan(&options, Phase::Prepare);
        if let Some(stage) = plan.stage(STAGE_PREPARE) {
            for action in stage.actions.iter().rev() {
                info!("Reverting action {}", action.name());
                action
                    .revert(&mut *self.host)
                    .map_err(|e| action_failed(Phase::Prepare, stage, action.as_ref(), &e))?;
            }
        }
        self.store.clear()?;
        info!("Revert finished, the server is back to its original state");
        Ok(())
    }

    fn preflight(&self, phase: Phase, resumed: bool) -> Result<()> {
        let checks = self.definition.check_actions(&self.options, phase);
        info!("Running {} pre-flight checks for phase {}", checks.len(), phase);
        run_checks(&checks, &*self.host).map_err(|failed| {
            DistupError::PreflightFailed {
                phase,
                check: failed.name,
                description: failed.description,
                resumed,
            }
            .into()
        })
    }
}

struct Driver<'a, S: StateStore> {
    definition: &'a UpgradeDefinition,
    machine: PhaseMachine<S>,
    host: &'a mut dyn Host,
}

impl<S: StateStore> Driver<'_, S> {
    fn run_pass(&mut self) -> Result<PassOutcome> {
        let pass_phase = self.machine.current_phase();
        let plan = self
            .definition
            .build_plan(self.machine.options(), pass_phase);
        let start = resume_index(&plan, self.machine.last_completed_stage())?;
        info!(
            "Running phase {} from stage {} of {}",
            pass_phase,
            start + 1,
            plan.len()
        );

        let mut final_reboot = false;
        for (index, stage) in plan.stages().iter().enumerate().skip(start) {
            self.enter_stage(stage)?;
            let phase = self.machine.current_phase();
            info!("Stage [{}/{}]: {}", index + 1, plan.len(), stage.name);

            let mut after_stage: Option<RebootRequest> = None;
            for action in &stage.actions {
                info!("Running action {}: {}", action.name(), action.description());
                if let Err(e) = action.execute(&mut *self.host, phase) {
                    self.record_failure(&stage.name, action.name(), &e);
                    return Err(action_failed(phase, stage, action.as_ref(), &e).into());
                }
                if let Some(request) = action.reboot_request(phase) {
                    debug!("Action {} requests reboot: {:?}", action.name(), request);
                    match request.point {
                        RebootPoint::AfterCurrentStage => {
                            after_stage = merge_requests(after_stage, request);
                        }
                        RebootPoint::AfterLastStage => final_reboot = true,
                    }
                }
            }
            self.machine.mark_stage_completed(&stage.name)?;

            if let Some(request) = after_stage {
                if let Some(next) = request.next_phase {
                    self.machine.transition_to(next)?;
                }
                info!("Rebooting after stage '{}'", stage.name);
                self.host.reboot()?;
                return Ok(PassOutcome::Done(RunOutcome::Rebooting {
                    phase: self.machine.current_phase(),
                    stage: stage.name.clone(),
                }));
            }
        }

        if self.machine.current_phase().is_forward() {
            self.machine.transition_to(Phase::Finish)?;
            return Ok(PassOutcome::NextPhase);
        }

        self.machine.mark_completed()?;
        info!("Upgrade to {} completed", self.definition.new_os());
        if final_reboot {
            info!("Issuing final reboot");
            self.host.reboot()?;
        }
        Ok(PassOutcome::Done(RunOutcome::Completed {
            rebooting: final_reboot,
        }))
    }

    /// Conversion-only stages move a run still in `prepare` to `convert`
    /// before they start.
    fn enter_stage(&mut self, stage: &Stage) -> Result<()> {
        if stage.restricted_to_phase != Some(Phase::Convert)
            || self.machine.current_phase() != Phase::Prepare
        {
            return Ok(());
        }
        let completed = self.machine.last_completed_stage().map(str::to_string);
        self.machine.transition_to(Phase::Convert)?;
        if let Some(completed) = completed {
            self.machine.mark_stage_completed(&completed)?;
        }
        Ok(())
    }

    fn record_failure(&mut self, stage: &str, action: &str, cause: &Error) {
        let path = self.machine.options().completion_flag_path.clone();
        let record = CompletionRecord::failure(
            &self.definition.name,
            format!("Action '{action}' in stage '{stage}' failed: {cause:#}"),
        );
        let written = record
            .to_json()
            .and_then(|content| self.host.write_file(&path, &content));
        if let Err(e) = written {
            error!("Failed to write completion flag {}: {:#}", path.display(), e);
        }
    }
}

/// Index of the first stage still to run.
fn resume_index(plan: &Plan, last_completed: Option<&str>) -> Result<usize> {
    let Some(name) = last_completed else {
        return Ok(0);
    };
    plan.position(name).map(|i| i + 1).ok_or_else(|| {
        DistupError::State(format!(
            "last completed stage '{name}' is not part of the {} plan",
            plan.phase()
        ))
        .into()
    })
}

/// A request that moves the phase wins over one that does not.
fn merge_requests(current: Option<RebootRequest>, new: RebootRequest) -> Option<RebootRequest> {
    match current {
        Some(existing) if existing.next_phase.is_some() => Some(existing),
        _ => Some(new),
    }
}

fn action_failed(phase: Phase, stage: &Stage, action: &dyn Action, cause: &Error) -> DistupError {
    DistupError::ActionFailed {
        phase,
        stage: stage.name.clone(),
        action: action.name().to_string(),
        reason: format!("{cause:#}"),
    }
}
