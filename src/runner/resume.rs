//! Cooperative resume loop.
//!
//! The interpreter cannot be preempted, so the loop is the harness's only lever over a
//! script that keeps yielding. It drives one loaded [`ExecutionContext`] through the
//! states below and refuses to re-enter the interpreter once the CPU budget is gone:
//!
//! ```text
//! Loaded --begin, resume--> Running --returned--> Completed
//!                              |  ^
//!                        yield |  | budget left, resume
//!                              v  |
//!                           Suspended --budget exhausted--> Failed (TimedOut)
//!
//! Running --error (script, CPU trip, memory refusal)--> Failed
//! ```
//!
//! A context that failed to load never reaches `Loaded`; the loop starts in `Failed`
//! with [`RunOutcome::LoadFailed`] and never touches the interpreter.

use mlua::{MultiValue, ThreadStatus};

use crate::{
    quota::QuotaTrip,
    runner::outcome::{RunOutcome, RunReport},
    sandbox::{ExecutionContext, Residue},
};

/// States of the resume loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum LoopState {
    /// Bytecode is loaded and the interpreter has not been entered.
    Loaded,
    /// The interpreter is executing the script.
    Running,
    /// The script yielded and is waiting to be resumed.
    Suspended,
    /// The script returned.
    Completed,
    /// The run ended without the script returning.
    Failed,
}

impl LoopState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Completed | LoopState::Failed)
    }
}

/// Drives one execution context to a terminal state.
#[derive(Debug)]
pub struct ResumeLoop<'c, 'h> {
    context: &'c mut ExecutionContext<'h>,
    state: LoopState,
    outcome: Option<RunOutcome>,
    message: Option<String>,
    yields: u32,
    resumes: u32,
}

impl<'c, 'h> ResumeLoop<'c, 'h> {
    /// Creates a loop over `context`.
    ///
    /// If the context holds no loaded thread, the loop starts out failed with
    /// [`RunOutcome::LoadFailed`].
    pub fn new(context: &'c mut ExecutionContext<'h>) -> Self {
        let loaded = context.thread().is_some();
        let mut resume = ResumeLoop {
            context,
            state: LoopState::Loaded,
            outcome: None,
            message: None,
            yields: 0,
            resumes: 0,
        };
        if !loaded {
            resume.fail(RunOutcome::LoadFailed, None);
        }
        resume
    }

    /// Returns the current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Returns the outcome once the loop is terminal.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// Returns the number of times the interpreter has been entered.
    pub fn resumes(&self) -> u32 {
        self.resumes
    }

    /// Returns the number of yields observed.
    pub fn yields(&self) -> u32 {
        self.yields
    }

    /// Advances the loop by one transition and returns the new state.
    ///
    /// Terminal states are sticky: stepping a `Completed` or `Failed` loop does nothing.
    pub fn step(&mut self) -> LoopState {
        match self.state {
            LoopState::Loaded => {
                self.context.quota().begin();
                log::debug!("run {} started", self.context.identity());
                self.enter();
            }
            LoopState::Suspended => {
                if let Err(trip) = self.context.quota().check_cpu() {
                    log::debug!(
                        "run {} not resumed: budget exhausted while suspended",
                        self.context.identity()
                    );
                    self.fail(RunOutcome::TimedOut, Some(trip.to_string()));
                } else {
                    self.enter();
                }
            }
            LoopState::Running | LoopState::Completed | LoopState::Failed => {}
        }
        self.state
    }

    /// Steps until a terminal state is reached and returns the run's report.
    pub fn run(mut self) -> RunReport {
        while !self.state.is_terminal() {
            self.step();
        }
        self.report()
    }

    /// Builds the report for the current state.
    pub fn report(&self) -> RunReport {
        let quota = self.context.quota();
        RunReport {
            outcome: self.outcome.unwrap_or(RunOutcome::RuntimeError),
            yields: self.yields,
            resumes: self.resumes,
            elapsed: quota.cpu().elapsed(),
            script_bytes: self.context.script_bytes(),
            returned: match self.context.pending() {
                Some(Residue::Returned(values)) => values.len(),
                _ => 0,
            },
            message: self.message.clone(),
        }
    }

    fn enter(&mut self) {
        let Some(thread) = self.context.thread().cloned() else {
            self.fail(RunOutcome::LoadFailed, None);
            return;
        };

        self.state = LoopState::Running;
        self.resumes += 1;

        match thread.resume::<MultiValue>(()) {
            Ok(values) => match thread.status() {
                ThreadStatus::Resumable => {
                    self.yields += 1;
                    self.state = LoopState::Suspended;
                }
                _ => self.complete(values),
            },
            Err(err) => {
                let outcome = self.classify(&err);
                let message = err.to_string();
                self.context.leave(Residue::Error(message.clone()));
                self.fail(outcome, Some(message));
            }
        }
    }

    fn complete(&mut self, values: MultiValue) {
        // Growth after the last safe-point is still the script's.
        if let Err(trip) = self.context.memory_checkpoint() {
            log::debug!("run {} over budget on return: {trip}", self.context.identity());
        }
        self.context.leave(Residue::Returned(values));

        // A trip the script swallowed with pcall still ends the run as a quota failure.
        if let Some(trip) = self.context.quota().trip() {
            self.fail(outcome_of(trip), Some(trip.to_string()));
            return;
        }

        self.state = LoopState::Completed;
        self.outcome = Some(if self.yields == 0 {
            RunOutcome::Completed
        } else {
            RunOutcome::YieldedToCompletion
        });
        log::debug!(
            "run {} completed after {} resumes",
            self.context.identity(),
            self.resumes
        );
    }

    fn classify(&self, err: &mlua::Error) -> RunOutcome {
        let quota = self.context.quota();
        if let Some(trip) = quota.trip() {
            return outcome_of(trip);
        }
        if let Some(trip) = err.downcast_ref::<QuotaTrip>() {
            return outcome_of(quota.record(*trip));
        }
        if is_memory_error(err) {
            self.context.record_refusal();
            return RunOutcome::MemoryExceeded;
        }
        RunOutcome::RuntimeError
    }

    fn fail(&mut self, outcome: RunOutcome, message: Option<String>) {
        self.state = LoopState::Failed;
        self.outcome = Some(outcome);
        self.message = message;
        log::debug!("run {} failed: {}", self.context.identity(), outcome);
    }
}

fn outcome_of(trip: QuotaTrip) -> RunOutcome {
    match trip {
        QuotaTrip::Cpu { .. } => RunOutcome::TimedOut,
        QuotaTrip::Memory { .. } => RunOutcome::MemoryExceeded,
    }
}

fn is_memory_error(err: &mlua::Error) -> bool {
    match err {
        mlua::Error::MemoryError(_) => true,
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            is_memory_error(cause)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::{rc::Rc, time::Duration};

    use super::*;
    use crate::{
        frontend::compile,
        quota::{QuotaConfig, QuotaState},
        sandbox::HostEnvironment,
        test::{ManualClock, RETURN_ONE, TIGHT_LOOP},
    };

    fn loaded<'h>(host: &'h HostEnvironment, source: &str, quota: QuotaState) -> ExecutionContext<'h> {
        let bytecode = compile(source).into_result().unwrap();
        let mut context = host.spawn_context(Rc::new(quota)).unwrap();
        context.load(&bytecode, "=test").unwrap();
        context
    }

    #[test]
    fn test_single_return_value() {
        let host = HostEnvironment::create().unwrap();
        let mut context = loaded(&host, RETURN_ONE, QuotaState::new(QuotaConfig::default()));

        let report = ResumeLoop::new(&mut context).run();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.returned, 1);
        assert_eq!(report.resumes, 1);
        assert_eq!(context.pending_len(), 1);
    }

    #[test]
    fn test_yield_then_complete() {
        let host = HostEnvironment::create().unwrap();
        let source = "for i = 1, 3 do coroutine.yield(i) end return 'done'";
        let mut context = loaded(&host, source, QuotaState::new(QuotaConfig::default()));

        let report = ResumeLoop::new(&mut context).run();
        assert_eq!(report.outcome, RunOutcome::YieldedToCompletion);
        assert_eq!(report.yields, 3);
        assert_eq!(report.resumes, 4);
    }

    #[test]
    fn test_budget_checked_before_resume() {
        let host = HostEnvironment::create().unwrap();
        let clock = ManualClock::new();
        let quota = QuotaState::with_clock(
            QuotaConfig::new().with_cpu_budget(Duration::from_millis(10)),
            Box::new(clock.clone()),
        );
        let mut context = loaded(&host, "while true do coroutine.yield() end", quota);

        let mut resume = ResumeLoop::new(&mut context);
        assert_eq!(resume.step(), LoopState::Suspended);
        assert_eq!(resume.step(), LoopState::Suspended);

        clock.advance(Duration::from_millis(11));
        assert_eq!(resume.step(), LoopState::Failed);
        assert_eq!(resume.resumes(), 2);
        assert_eq!(resume.outcome(), Some(RunOutcome::TimedOut));

        assert_eq!(resume.step(), LoopState::Failed);
        assert_eq!(resume.resumes(), 2);
    }

    #[test]
    fn test_runtime_error_leaves_one_value() {
        let host = HostEnvironment::create().unwrap();
        let mut context = loaded(&host, "error('boom')", QuotaState::new(QuotaConfig::default()));

        let report = ResumeLoop::new(&mut context).run();
        assert_eq!(report.outcome, RunOutcome::RuntimeError);
        assert!(report.message.unwrap().contains("boom"));
        assert!(matches!(context.pending(), Some(Residue::Error(_))));
        assert_eq!(context.pending_len(), 1);
    }

    #[test]
    fn test_unloaded_context_fails_to_load() {
        let host = HostEnvironment::create().unwrap();
        let mut context = host
            .spawn_context(Rc::new(QuotaState::new(QuotaConfig::default())))
            .unwrap();

        let mut resume = ResumeLoop::new(&mut context);
        assert_eq!(resume.state(), LoopState::Failed);
        assert_eq!(resume.step(), LoopState::Failed);
        assert_eq!(resume.report().outcome, RunOutcome::LoadFailed);
        assert_eq!(resume.resumes(), 0);
    }

    #[test]
    fn test_tight_loop_times_out() {
        let host = HostEnvironment::create().unwrap();
        let quota = QuotaState::new(QuotaConfig::new().with_cpu_budget(Duration::from_millis(5)));
        let mut context = loaded(&host, TIGHT_LOOP, quota);

        let report = ResumeLoop::new(&mut context).run();
        assert_eq!(report.outcome, RunOutcome::TimedOut);
        assert!(report.elapsed > Duration::from_millis(5));
    }

    #[test]
    fn test_memory_monitor_vetoes_under_ceiling() {
        let host = HostEnvironment::create().unwrap();
        let config = QuotaConfig::new().with_memory_budget(64 * 1024);
        let quota = QuotaState::new(config);
        // Over the budget, well under the allocator ceiling.
        let source = "local s = string.rep('x', 96 * 1024) return #s";
        let mut context = loaded(&host, source, quota);

        let report = ResumeLoop::new(&mut context).run();
        assert_eq!(report.outcome, RunOutcome::MemoryExceeded);

        let quota = context.quota();
        assert!(quota.memory().recomputes() > 0);
        match quota.trip() {
            Some(QuotaTrip::Memory { requested, in_use, budget }) => {
                assert!(requested > 0);
                assert!(in_use + requested > budget);
                assert_eq!(budget, 64 * 1024);
            }
            other => panic!("expected a memory trip, got {other:?}"),
        }
    }

    #[test]
    fn test_caught_refusal_is_recorded() {
        let host = HostEnvironment::create().unwrap();
        let quota = QuotaState::new(QuotaConfig::default());
        let source = "local ok = pcall(function() return string.rep('x', 1e7) end) return ok";
        let mut context = loaded(&host, source, quota);

        let report = ResumeLoop::new(&mut context).run();
        assert_eq!(report.outcome, RunOutcome::MemoryExceeded);
        assert!(matches!(
            context.quota().trip(),
            Some(QuotaTrip::Memory { requested, .. }) if requested > 0
        ));
    }
}
