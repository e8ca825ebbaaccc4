//! Quota configuration.
//!
//! [`QuotaConfig`] holds the two budgets enforced for every script run: a CPU budget
//! measured on a monotonic cycle clock and a memory budget measured in bytes of
//! script-attributed memory.
//!
//! # Default Values
//!
//! | Budget | Default Value |
//! |--------|---------------|
//! | `cpu_budget` | 10 ms |
//! | `memory_budget` | 256 KiB |
//!
//! The memory budget is enforced by the memory monitor at interpreter safe-points. The
//! interpreter allocator is additionally capped at
//! [`allocator_ceiling`](QuotaConfig::allocator_ceiling) bytes above the run's baseline,
//! so that a single huge request is refused outright instead of being granted and only
//! caught afterwards.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use luaubox::quota::QuotaConfig;
//!
//! let quota = QuotaConfig::new()
//!     .with_cpu_budget(Duration::from_millis(50))
//!     .with_memory_budget(1024 * 1024);
//! assert!(quota.validate().is_ok());
//! ```

use std::time::Duration;

use crate::{Error, Result};

/// Default CPU budget per run.
pub const DEFAULT_CPU_BUDGET: Duration = Duration::from_millis(10);

/// Default memory budget per run, in bytes.
pub const DEFAULT_MEMORY_BUDGET: usize = 256 * 1024;

/// Multiple of the memory budget at which the interpreter allocator refuses requests.
pub const ALLOCATOR_CEILING_FACTOR: usize = 2;

/// CPU and memory budgets for one script run.
///
/// Timeouts are advisory-bounded: the CPU budget is checked at interpreter safe-points,
/// so a run can overshoot it by up to one safe-point interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Maximum elapsed cycle-clock time for one run, including all resumes.
    pub cpu_budget: Duration,

    /// Maximum bytes of script-attributed memory.
    ///
    /// A run may allocate up to exactly this many bytes; the first request that would
    /// go past it is rejected.
    pub memory_budget: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            cpu_budget: DEFAULT_CPU_BUDGET,
            memory_budget: DEFAULT_MEMORY_BUDGET,
        }
    }
}

impl QuotaConfig {
    /// Creates a configuration with default budgets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the CPU budget.
    pub fn with_cpu_budget(mut self, budget: Duration) -> Self {
        self.cpu_budget = budget;
        self
    }

    /// Sets the memory budget in bytes.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Bytes above the run's baseline past which the allocator refuses any request.
    pub fn allocator_ceiling(&self) -> usize {
        self.memory_budget.saturating_mul(ALLOCATOR_CEILING_FACTOR)
    }

    /// Checks that both budgets are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero budget.
    pub fn validate(&self) -> Result<()> {
        if self.cpu_budget.is_zero() {
            return Err(Error::InvalidConfig("cpu budget must be non-zero".into()));
        }
        if self.memory_budget == 0 {
            return Err(Error::InvalidConfig(
                "memory budget must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
