//! Post-run sandbox invariants.
//!
//! A script can fail in any number of ways without that being the harness's problem.
//! What must never happen is that a run, however it ended, leaves the host in a state
//! different from the one it found. The [`InvariantChecker`] captures the host's anchor
//! stack depth before a context is spawned and verifies, in two phases:
//!
//! 1. [`settle`](InvariantChecker::settle), before teardown: the residue the run left
//!    on its context matches its outcome (a caught script error leaves exactly one
//!    diagnostic value, which is popped here).
//! 2. [`check`](InvariantChecker::check), after teardown: the anchor stack is back at
//!    its baseline depth, no run is armed on the host, and the run's quota state is no
//!    longer referenced by the host.
//!
//! A violation means isolation failed. [`InvariantChecker::enforce`] treats it as fatal
//! and aborts the process instead of letting further scripts run in a compromised host.

use std::rc::Rc;

use crate::{
    quota::QuotaState,
    runner::outcome::RunOutcome,
    sandbox::{ExecutionContext, HostEnvironment, Residue},
};

/// A broken sandbox invariant.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// The anchor stack did not return to its pre-run depth.
    #[error("stack depth {actual} after run, expected {expected}")]
    StackDepth {
        /// Depth before the run.
        expected: usize,
        /// Depth after teardown.
        actual: usize,
    },
    /// The residue left on the context does not match the outcome.
    #[error("{outcome} run left {found} values, expected {expected}")]
    Residue {
        /// Outcome of the run.
        outcome: RunOutcome,
        /// Values expected.
        expected: usize,
        /// Values found.
        found: usize,
    },
    /// A run is still armed on the host after teardown.
    #[error("host still has an armed run after teardown")]
    StillArmed,
    /// Someone other than the caller still holds the run's quota state.
    #[error("quota state still has {0} owners after teardown")]
    QuotaLeaked(usize),
}

/// Captures the pre-run baseline and validates the host after the run.
#[derive(Clone, Copy, Debug)]
pub struct InvariantChecker {
    baseline_depth: usize,
}

impl InvariantChecker {
    /// Captures `host`'s baseline. Call before spawning the context.
    pub fn new(host: &HostEnvironment) -> Self {
        InvariantChecker {
            baseline_depth: host.stack_depth(),
        }
    }

    /// Returns the captured baseline depth.
    pub fn baseline_depth(&self) -> usize {
        self.baseline_depth
    }

    /// Validates and pops the residue a terminal run left on `context`.
    ///
    /// Returns the number of values popped.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::Residue`] if a run that failed on a script error
    /// did not leave exactly one diagnostic value, or a run that did not fail on an
    /// error left one.
    pub fn settle(
        &self,
        context: &mut ExecutionContext<'_>,
        outcome: RunOutcome,
    ) -> Result<usize, InvariantViolation> {
        let residue = context.take_pending();
        let found = residue.as_ref().map_or(0, Residue::len);
        let violation = |expected| InvariantViolation::Residue {
            outcome,
            expected,
            found,
        };

        match residue {
            Some(Residue::Error(_)) if found == 1 => Ok(found),
            Some(Residue::Error(_)) => Err(violation(1)),
            Some(Residue::Returned(_)) if outcome.is_success() || outcome.is_quota() => {
                Ok(found)
            }
            Some(Residue::Returned(_)) => Err(violation(0)),
            None if outcome.is_success() => Err(violation(1)),
            None => Ok(0),
        }
    }

    /// Checks the host after the context has been torn down.
    ///
    /// `quota` is the caller's handle on the run's quota state; it must be the only
    /// one left.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn check(
        &self,
        host: &HostEnvironment,
        quota: &Rc<QuotaState>,
    ) -> Result<(), InvariantViolation> {
        let actual = host.stack_depth();
        if actual != self.baseline_depth {
            return Err(InvariantViolation::StackDepth {
                expected: self.baseline_depth,
                actual,
            });
        }
        if host.is_busy() {
            return Err(InvariantViolation::StillArmed);
        }
        let owners = Rc::strong_count(quota);
        if owners != 1 {
            return Err(InvariantViolation::QuotaLeaked(owners));
        }
        Ok(())
    }

    /// Aborts the process if `result` is a violation.
    pub fn enforce(result: Result<(), InvariantViolation>) {
        if let Err(violation) = result {
            log::error!("sandbox invariant violated: {violation}");
            std::process::abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaConfig;

    #[test]
    fn test_balanced_host_passes() {
        let host = HostEnvironment::create().unwrap();
        let checker = InvariantChecker::new(&host);
        let quota = Rc::new(QuotaState::new(QuotaConfig::default()));

        let mut context = host.spawn_context(Rc::clone(&quota)).unwrap();
        assert_eq!(checker.settle(&mut context, RunOutcome::LoadFailed), Ok(0));
        drop(context);

        assert_eq!(checker.check(&host, &quota), Ok(()));
    }

    #[test]
    fn test_live_context_is_a_violation() {
        let host = HostEnvironment::create().unwrap();
        let checker = InvariantChecker::new(&host);
        let quota = Rc::new(QuotaState::new(QuotaConfig::default()));

        let _context = host.spawn_context(Rc::clone(&quota)).unwrap();
        assert_eq!(
            checker.check(&host, &quota),
            Err(InvariantViolation::StackDepth {
                expected: 0,
                actual: 1
            })
        );
    }

    #[test]
    fn test_error_residue_is_popped() {
        let host = HostEnvironment::create().unwrap();
        let checker = InvariantChecker::new(&host);
        let quota = Rc::new(QuotaState::new(QuotaConfig::default()));

        let mut context = host.spawn_context(quota).unwrap();
        context.leave(Residue::Error("boom".into()));
        assert_eq!(checker.settle(&mut context, RunOutcome::RuntimeError), Ok(1));
        assert_eq!(context.pending_len(), 0);
    }

    #[test]
    fn test_missing_return_is_a_violation() {
        let host = HostEnvironment::create().unwrap();
        let checker = InvariantChecker::new(&host);
        let quota = Rc::new(QuotaState::new(QuotaConfig::default()));

        let mut context = host.spawn_context(quota).unwrap();
        assert!(matches!(
            checker.settle(&mut context, RunOutcome::Completed),
            Err(InvariantViolation::Residue { .. })
        ));
    }
}
