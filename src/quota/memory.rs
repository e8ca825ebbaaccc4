//! Memory monitor with two-tier accounting.
//!
//! The monitor sees every growth request as an `(old_size, new_size)` pair. Shrinks and
//! frees are always admitted. Growth is added to a cheap running total; only when that
//! total plus the requested delta would cross the budget is the exact script usage
//! recomputed through a caller-supplied probe. The request is rejected only if the
//! exact figure plus the delta still crosses the budget.
//!
//! The running total never rejects on its own. A rejection always rests on a fresh
//! exact figure, so a stale running total can cost an extra recompute but never a
//! spurious failure.

use std::cell::Cell;

use crate::quota::state::QuotaTrip;

/// Per-run memory budget monitor.
#[derive(Debug)]
pub struct MemoryMonitor {
    budget: usize,
    approx: Cell<usize>,
    recomputes: Cell<u64>,
}

impl MemoryMonitor {
    /// Creates a monitor for `budget` bytes.
    pub fn new(budget: usize) -> Self {
        MemoryMonitor {
            budget,
            approx: Cell::new(0),
            recomputes: Cell::new(0),
        }
    }

    /// Resets the running total. Called at the start of every run.
    pub fn reset(&self) {
        self.approx.set(0);
        self.recomputes.set(0);
    }

    /// Returns the configured budget.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Returns the running approximate total.
    pub fn approx_bytes(&self) -> usize {
        self.approx.get()
    }

    /// Returns how many exact recomputations this run has needed.
    pub fn recomputes(&self) -> u64 {
        self.recomputes.get()
    }

    /// Admits or rejects a request to resize a block from `old_size` to `new_size`.
    ///
    /// `exact` returns the current exact script-attributed usage. It is only invoked
    /// when the running total is close enough to the budget to matter.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaTrip::Memory`] if the request would take exact usage past the
    /// budget. A rejected request leaves the running total at the exact figure.
    pub fn admit<F>(&self, old_size: usize, new_size: usize, exact: F) -> Result<(), QuotaTrip>
    where
        F: FnOnce() -> usize,
    {
        if old_size >= new_size {
            return Ok(());
        }

        let delta = new_size - old_size;
        if self.approx.get().saturating_add(delta) > self.budget {
            let in_use = exact();
            self.approx.set(in_use);
            self.recomputes.set(self.recomputes.get() + 1);
            log::trace!(
                "memory recompute: {} bytes in use, {} requested, budget {}",
                in_use,
                delta,
                self.budget
            );

            if in_use.saturating_add(delta) > self.budget {
                return Err(QuotaTrip::Memory {
                    requested: delta,
                    in_use,
                    budget: self.budget,
                });
            }
        }

        self.approx.set(self.approx.get().saturating_add(delta));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_shrink_and_free_always_admitted() {
        let monitor = MemoryMonitor::new(16);
        assert!(monitor
            .admit(1024, 8, || panic!("no recompute on shrink"))
            .is_ok());
        assert!(monitor.admit(64, 0, || panic!("no recompute on free")).is_ok());
        assert_eq!(monitor.approx_bytes(), 0);
    }

    #[test]
    fn test_cheap_path_skips_probe() {
        let monitor = MemoryMonitor::new(1000);
        for _ in 0..10 {
            monitor.admit(0, 100, || panic!("probe not expected")).unwrap();
        }
        assert_eq!(monitor.approx_bytes(), 1000);
        assert_eq!(monitor.recomputes(), 0);
    }

    #[test]
    fn test_recompute_near_limit_admits_when_exact_is_lower() {
        let monitor = MemoryMonitor::new(1000);
        monitor.admit(0, 900, || 0).unwrap();

        let probed = Cell::new(false);
        monitor
            .admit(0, 200, || {
                probed.set(true);
                300
            })
            .unwrap();

        assert!(probed.get());
        assert_eq!(monitor.approx_bytes(), 500);
        assert_eq!(monitor.recomputes(), 1);
    }

    #[test]
    fn test_rejects_when_exact_crosses_budget() {
        let monitor = MemoryMonitor::new(1000);
        let result = monitor.admit(0, 1001, || 0);
        assert_eq!(
            result,
            Err(QuotaTrip::Memory {
                requested: 1001,
                in_use: 0,
                budget: 1000,
            })
        );
    }

    #[test]
    fn test_exactly_at_budget_admitted() {
        let monitor = MemoryMonitor::new(1000);
        monitor.admit(0, 400, || 0).unwrap();
        assert!(monitor.admit(100, 700, || 400).is_ok());
        assert_eq!(monitor.approx_bytes(), 1000);
    }

    #[test]
    fn test_reset_clears_running_total() {
        let monitor = MemoryMonitor::new(1000);
        monitor.admit(0, 800, || 0).unwrap();
        monitor.reset();
        assert_eq!(monitor.approx_bytes(), 0);
        monitor.admit(0, 800, || panic!("probe not expected")).unwrap();
    }
}
