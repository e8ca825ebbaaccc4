//! Per-run quota state.
//!
//! A [`QuotaState`] is constructed for each run and owns both monitors together with
//! the first quota trip of the run. It is shared by reference between the resume loop
//! and the host's safe-point callback for the duration of the run only; nothing about
//! it is process-global, so repeated runs never share counters.

use std::{cell::Cell, fmt, time::Duration};

use crate::quota::{
    clock::{CycleClock, MonotonicClock},
    config::QuotaConfig,
    cpu::CpuMonitor,
    memory::MemoryMonitor,
};

/// A quota violation. Raised into the script as a catchable runtime error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QuotaTrip {
    /// The CPU budget was exceeded.
    #[error("execution timed out")]
    Cpu {
        /// Time elapsed when the trip was detected.
        elapsed: Duration,
        /// Configured budget.
        budget: Duration,
    },
    /// A memory request was rejected.
    #[error("not enough memory")]
    Memory {
        /// Bytes requested by the rejected growth.
        requested: usize,
        /// Exact script-attributed bytes in use at rejection.
        in_use: usize,
        /// Configured budget.
        budget: usize,
    },
}

/// Both monitors for one run, plus the run's first trip.
pub struct QuotaState {
    config: QuotaConfig,
    cpu: CpuMonitor,
    memory: MemoryMonitor,
    trip: Cell<Option<QuotaTrip>>,
    safepoints: Cell<u64>,
}

impl QuotaState {
    /// Creates quota state for `config` using the monotonic clock.
    pub fn new(config: QuotaConfig) -> Self {
        Self::with_clock(config, Box::new(MonotonicClock::new()))
    }

    /// Creates quota state for `config` reading time from `clock`.
    pub fn with_clock(config: QuotaConfig, clock: Box<dyn CycleClock>) -> Self {
        QuotaState {
            config,
            cpu: CpuMonitor::new(config.cpu_budget, clock),
            memory: MemoryMonitor::new(config.memory_budget),
            trip: Cell::new(None),
            safepoints: Cell::new(0),
        }
    }

    /// Starts a run: captures the CPU start stamp and clears the memory total and trip.
    pub fn begin(&self) {
        self.memory.reset();
        self.trip.set(None);
        self.safepoints.set(0);
        self.cpu.start();
    }

    /// Returns the budgets this state enforces.
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Returns the CPU monitor.
    pub fn cpu(&self) -> &CpuMonitor {
        &self.cpu
    }

    /// Returns the memory monitor.
    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    /// Returns the first trip recorded during the run.
    pub fn trip(&self) -> Option<QuotaTrip> {
        self.trip.get()
    }

    /// Returns the number of safe-point callbacks seen during the run.
    pub fn safepoints(&self) -> u64 {
        self.safepoints.get()
    }

    /// Records `trip` unless an earlier trip is already recorded, and returns it.
    pub fn record(&self, trip: QuotaTrip) -> QuotaTrip {
        if self.trip.get().is_none() {
            log::warn!("quota tripped: {trip:?}");
            self.trip.set(Some(trip));
        }
        trip
    }

    /// Checks the CPU budget, recording a trip if it is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaTrip::Cpu`] once the budget is exceeded.
    pub fn check_cpu(&self) -> Result<(), QuotaTrip> {
        self.cpu.check().map_err(|trip| self.record(trip))
    }

    /// Admits a memory request, recording a trip if it is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaTrip::Memory`] if the request is rejected.
    pub fn admit_memory<F>(&self, old_size: usize, new_size: usize, exact: F) -> Result<(), QuotaTrip>
    where
        F: FnOnce() -> usize,
    {
        self.memory
            .admit(old_size, new_size, exact)
            .map_err(|trip| self.record(trip))
    }

    /// Runs both checks for one interpreter safe-point.
    ///
    /// # Errors
    ///
    /// Returns the first trip encountered, CPU before memory.
    pub fn on_safepoint<F>(&self, old_size: usize, new_size: usize, exact: F) -> Result<(), QuotaTrip>
    where
        F: FnOnce() -> usize,
    {
        self.safepoints.set(self.safepoints.get() + 1);
        self.check_cpu()?;
        self.admit_memory(old_size, new_size, exact)
    }
}

impl fmt::Debug for QuotaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaState")
            .field("config", &self.config)
            .field("elapsed", &self.cpu.elapsed())
            .field("approx_bytes", &self.memory.approx_bytes())
            .field("trip", &self.trip.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ManualClock;

    fn state(clock: &ManualClock) -> QuotaState {
        QuotaState::with_clock(
            QuotaConfig::new()
                .with_cpu_budget(Duration::from_millis(10))
                .with_memory_budget(1024),
            Box::new(clock.clone()),
        )
    }

    #[test]
    fn test_first_trip_wins() {
        let clock = ManualClock::new();
        let quota = state(&clock);
        quota.begin();

        assert!(quota.admit_memory(0, 2048, || 0).is_err());
        clock.advance(Duration::from_millis(20));
        assert!(quota.check_cpu().is_err());

        assert!(matches!(quota.trip(), Some(QuotaTrip::Memory { .. })));
    }

    #[test]
    fn test_safepoint_checks_cpu_first() {
        let clock = ManualClock::new();
        let quota = state(&clock);
        quota.begin();
        clock.advance(Duration::from_millis(11));

        let trip = quota
            .on_safepoint(0, 4096, || panic!("memory not consulted"))
            .unwrap_err();
        assert!(matches!(trip, QuotaTrip::Cpu { .. }));
        assert_eq!(quota.safepoints(), 1);
    }

    #[test]
    fn test_begin_resets_run() {
        let clock = ManualClock::new();
        let quota = state(&clock);
        quota.begin();
        quota.admit_memory(0, 512, || 0).unwrap();
        clock.advance(Duration::from_millis(50));
        let _ = quota.check_cpu();
        assert!(quota.trip().is_some());

        quota.begin();
        assert!(quota.trip().is_none());
        assert_eq!(quota.memory().approx_bytes(), 0);
        assert!(quota.check_cpu().is_ok());
    }

    #[test]
    fn test_trip_messages() {
        let cpu = QuotaTrip::Cpu {
            elapsed: Duration::from_millis(11),
            budget: Duration::from_millis(10),
        };
        assert_eq!(cpu.to_string(), "execution timed out");
    }
}
