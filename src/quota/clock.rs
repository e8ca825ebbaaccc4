//! Cycle clocks used by the CPU monitor.
//!
//! The CPU monitor only needs a monotonic counter that never goes backwards. The
//! production clock is [`MonotonicClock`]; tests substitute a manually advanced clock.

use std::{fmt, time::Instant};

/// A monotonic time source for CPU budget checks.
pub trait CycleClock: fmt::Debug {
    /// Returns the current reading in nanoseconds since an arbitrary, fixed origin.
    ///
    /// Successive calls must never return a smaller value.
    fn now(&self) -> u64;
}

/// Monotonic clock backed by [`Instant`].
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is the current instant.
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleClock for MonotonicClock {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
