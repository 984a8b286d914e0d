//! Ordered resolution phases and the barrier that advances through them.
//!
//! Each [`Stage`] has a set of hooks, one per unit of work. A stage is done
//! once all of its hooks have reported; the scheduler then fires the stage's
//! callbacks and moves to the next one. Completion is not checked on every
//! report: activity marks the scheduler dirty and the check runs once the
//! host polls after a quiet window of [`StageScheduler::debounce_ms`], so a
//! burst of registrations settles before anything advances.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::error::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    AddNodes,
    MarkHidden,
    EvaluateExpressions,
    OptionsFetched,
    Finished,
}

impl Stage {
    /// Every stage, in the order a render cycle visits them.
    pub const ORDER: [Stage; 5] = [
        Stage::AddNodes,
        Stage::MarkHidden,
        Stage::EvaluateExpressions,
        Stage::OptionsFetched,
        Stage::Finished,
    ];

    pub fn index(self) -> usize {
        match self {
            Stage::AddNodes => 0,
            Stage::MarkHidden => 1,
            Stage::EvaluateExpressions => 2,
            Stage::OptionsFetched => 3,
            Stage::Finished => 4,
        }
    }

    pub fn next(self) -> Option<Stage> {
        Stage::ORDER.get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::AddNodes => "AddNodes",
            Stage::MarkHidden => "MarkHidden",
            Stage::EvaluateExpressions => "EvaluateExpressions",
            Stage::OptionsFetched => "OptionsFetched",
            Stage::Finished => "Finished",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host clock reading in milliseconds. Only differences matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    pub fn after(self, millis: u64) -> HostTime {
        HostTime(self.0.saturating_add(millis))
    }
}

type PhaseCallback = Box<dyn FnOnce(Stage)>;

#[derive(Default)]
struct Phase {
    /// Hook id to whether it reported done.
    hooks: IndexMap<String, bool>,
    done: bool,
    callbacks: Vec<PhaseCallback>,
}

impl Phase {
    fn is_complete(&self) -> bool {
        self.hooks.values().all(|done| *done)
    }
}

pub struct StageScheduler {
    debounce_ms: u64,
    current: Stage,
    phases: Vec<Phase>,
    dirty: bool,
    deadline: Option<HostTime>,
    finished: bool,
}

impl fmt::Debug for StageScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageScheduler")
            .field("debounce_ms", &self.debounce_ms)
            .field("current", &self.current)
            .field("dirty", &self.dirty)
            .field("deadline", &self.deadline)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Default for StageScheduler {
    fn default() -> Self {
        Self::new(EngineConfig::default().debounce_ms)
    }
}

impl StageScheduler {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            current: Stage::AddNodes,
            phases: Stage::ORDER.iter().map(|_| Phase::default()).collect(),
            dirty: true,
            deadline: None,
            finished: false,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.debounce_ms)
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    pub fn current_phase(&self) -> Stage {
        self.current
    }

    /// True once the `Finished` stage itself completed.
    pub fn is_settled(&self) -> bool {
        self.finished
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.phase(stage).done
    }

    /// Ids of the hooks of `stage` that have not reported yet.
    pub fn pending(&self, stage: Stage) -> Vec<&str> {
        self.phase(stage)
            .hooks
            .iter()
            .filter(|(_, done)| !**done)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    fn phase(&self, stage: Stage) -> &Phase {
        &self.phases[stage.index()]
    }

    fn phase_mut(&mut self, stage: Stage) -> &mut Phase {
        &mut self.phases[stage.index()]
    }

    /// Registers hook `id` for `stage`. Registering an id twice keeps its
    /// state. A stage that already completed is not reopened, and once the
    /// whole pipeline finished any registration for a completed stage is
    /// refused.
    pub fn register_hook(&mut self, stage: Stage, id: &str) -> Result<(), SchedulerError> {
        if self.finished && self.is_done(stage) {
            let err = SchedulerError::RegisteredAfterFinish {
                stage,
                hook: id.to_string(),
            };
            error!(stage = %stage, hook = id, "{}", err);
            return Err(err);
        }
        let phase = self.phase_mut(stage);
        if phase.hooks.contains_key(id) {
            return Ok(());
        }
        phase.hooks.insert(id.to_string(), false);
        if phase.done {
            debug!(stage = %stage, hook = id, "hook registered for a completed stage");
        }
        self.dirty = true;
        Ok(())
    }

    /// Marks hook `id` of `stage` as done. Reporting twice is a no-op.
    /// Reports for a stage that has not started yet are refused, as are
    /// reports for hooks that were never registered.
    pub fn report_done(&mut self, stage: Stage, id: &str) -> bool {
        if stage > self.current {
            warn!(
                stage = %stage,
                current = %self.current,
                hook = id,
                "refusing completion report for a stage that has not started"
            );
            return false;
        }
        match self.phase_mut(stage).hooks.get_mut(id) {
            Some(done) if *done => true,
            Some(done) => {
                *done = true;
                self.dirty = true;
                true
            }
            None => {
                warn!(stage = %stage, hook = id, "completion report for unknown hook");
                false
            }
        }
    }

    /// Removes hook `id` from `stage`. A pending hook is cancelled; the
    /// stage is rechecked on a later poll rather than completed here.
    pub fn unregister(&mut self, stage: Stage, id: &str) {
        if self.phase_mut(stage).hooks.shift_remove(id).is_some() {
            self.dirty = true;
        }
    }

    /// Runs `callback` once `stage` completes, or right away if it already
    /// has.
    pub fn on_phase_done(&mut self, stage: Stage, callback: impl FnOnce(Stage) + 'static) {
        if self.is_done(stage) {
            callback(stage);
        } else {
            self.phase_mut(stage).callbacks.push(Box::new(callback));
        }
    }

    /// Advances the host clock. Returns the current stage afterwards.
    ///
    /// Pending activity starts a new quiet window ending at
    /// `now + debounce_ms`; the first poll at or after the window's end
    /// checks completion of the current stage.
    pub fn poll(&mut self, now: HostTime) -> Stage {
        if self.dirty {
            self.dirty = false;
            self.deadline = Some(now.after(self.debounce_ms));
            return self.current;
        }
        if let Some(deadline) = self.deadline
            && now >= deadline
        {
            self.deadline = None;
            self.check();
        }
        self.current
    }

    /// Checks completion immediately, without waiting for the quiet window.
    pub fn flush(&mut self) -> Stage {
        self.dirty = false;
        self.deadline = None;
        self.check();
        self.current
    }

    /// Starts a new render cycle from `AddNodes`, dropping every hook and
    /// callback.
    pub fn reset(&mut self) {
        debug!("scheduler reset");
        *self = Self::new(self.debounce_ms);
    }

    /// Completes the current stage if all of its hooks reported. At most one
    /// stage completes per check, giving the next stage's hooks a quiet
    /// window to register.
    fn check(&mut self) {
        if self.finished {
            return;
        }
        let stage = self.current;
        let phase = self.phase_mut(stage);
        if !phase.is_complete() {
            debug!(stage = %stage, pending = phase.hooks.values().filter(|done| !**done).count(), "stage still pending");
            return;
        }
        phase.done = true;
        let callbacks = std::mem::take(&mut phase.callbacks);
        debug!(stage = %stage, hooks = phase.hooks.len(), "stage done");
        for callback in callbacks {
            callback(stage);
        }
        match stage.next() {
            Some(next) => {
                self.current = next;
                self.dirty = true;
            }
            None => self.finished = true,
        }
    }
}
