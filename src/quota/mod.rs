//! Quota monitors.
//!
//! Two independent policies bound every script run:
//!
//! - [`CpuMonitor`] - vetoes execution once a cycle-clock budget has elapsed since the
//!   run started
//! - [`MemoryMonitor`] - admits or rejects memory growth against a byte budget using a
//!   cheap running total backed by an exact recompute near the limit
//!
//! Neither monitor can preempt the interpreter. They take effect only at the
//! interpreter's safe-points, at the resume loop's re-entry boundary and, for memory,
//! once more when the script returns. Both are owned
//! by a per-run [`QuotaState`], which also records the first [`QuotaTrip`] of the run.

mod clock;
mod config;
mod cpu;
mod memory;
mod state;

pub use clock::{CycleClock, MonotonicClock};
pub use config::{QuotaConfig, ALLOCATOR_CEILING_FACTOR, DEFAULT_CPU_BUDGET, DEFAULT_MEMORY_BUDGET};
pub use cpu::CpuMonitor;
pub use memory::MemoryMonitor;
pub use state::{QuotaState, QuotaTrip};
