//! CPU-cycle monitor.
//!
//! The interpreter cannot be preempted mid-instruction. The monitor is therefore
//! polled at the interpreter's own safe-points (loop back-edges, calls) and by the
//! resume loop between resumes, and vetoes further execution once the elapsed time
//! since [`CpuMonitor::start`] exceeds the budget.
//!
//! Enforcement granularity is one safe-point interval: a script can run past the
//! budget by at most the work done between two consecutive safe-points.

use std::{cell::Cell, time::Duration};

use crate::quota::{clock::CycleClock, state::QuotaTrip};

/// Per-run CPU budget monitor.
#[derive(Debug)]
pub struct CpuMonitor {
    clock: Box<dyn CycleClock>,
    budget: Duration,
    start: Cell<Option<u64>>,
}

impl CpuMonitor {
    /// Creates a monitor for `budget`, reading time from `clock`.
    pub fn new(budget: Duration, clock: Box<dyn CycleClock>) -> Self {
        CpuMonitor {
            clock,
            budget,
            start: Cell::new(None),
        }
    }

    /// Records the start stamp of a run. Calling it again restarts the budget.
    pub fn start(&self) {
        self.start.set(Some(self.clock.now()));
    }

    /// Returns `true` once [`start`](Self::start) has been called.
    pub fn is_started(&self) -> bool {
        self.start.get().is_some()
    }

    /// Returns the configured budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Returns the time elapsed since the start stamp, zero if not started.
    pub fn elapsed(&self) -> Duration {
        match self.start.get() {
            Some(start) => Duration::from_nanos(self.clock.now().saturating_sub(start)),
            None => Duration::ZERO,
        }
    }

    /// Checks the budget.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaTrip::Cpu`] if strictly more than the budget has elapsed.
    pub fn check(&self) -> Result<(), QuotaTrip> {
        let elapsed = self.elapsed();
        if elapsed > self.budget {
            return Err(QuotaTrip::Cpu {
                elapsed,
                budget: self.budget,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ManualClock;

    #[test]
    fn test_not_started_never_trips() {
        let clock = ManualClock::new();
        let monitor = CpuMonitor::new(Duration::from_millis(1), Box::new(clock.clone()));
        clock.advance(Duration::from_secs(10));
        assert!(!monitor.is_started());
        assert!(monitor.check().is_ok());
    }

    #[test]
    fn test_trips_strictly_after_budget() {
        let clock = ManualClock::new();
        let monitor = CpuMonitor::new(Duration::from_millis(10), Box::new(clock.clone()));
        monitor.start();

        clock.advance(Duration::from_millis(10));
        assert!(monitor.check().is_ok());

        clock.advance(Duration::from_nanos(1));
        match monitor.check() {
            Err(QuotaTrip::Cpu { elapsed, budget }) => {
                assert_eq!(budget, Duration::from_millis(10));
                assert!(elapsed > budget);
            }
            other => panic!("expected cpu trip, got {other:?}"),
        }
    }

    #[test]
    fn test_restart_resets_budget() {
        let clock = ManualClock::new();
        let monitor = CpuMonitor::new(Duration::from_millis(5), Box::new(clock.clone()));
        monitor.start();
        clock.advance(Duration::from_millis(6));
        assert!(monitor.check().is_err());

        monitor.start();
        assert_eq!(monitor.elapsed(), Duration::ZERO);
        assert!(monitor.check().is_ok());
    }
}
