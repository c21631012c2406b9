//! [`crate::time::TimeSource`] backed by [`super::clock`]'s tick counter.

use crate::time::{Instant, TimeSource};

/// A `TimeSource` whose units are APIC-timer ticks since boot.
#[derive(Debug, Default)]
pub struct TickTimeSource;

impl TimeSource for TickTimeSource {
    fn read_main_counter(&self) -> Instant {
        Instant(super::clock::now())
    }

    fn counter_after(&self, from: Instant, period: u64) -> Instant {
        Instant(from.0.wrapping_add(period))
    }

    fn is_greater(&self, lhs: Instant, rhs: Instant) -> bool {
        lhs.0.wrapping_sub(rhs.0) as i64 > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerates_wraparound() {
        let ts = TickTimeSource;
        assert!(ts.is_greater(Instant(5u64.wrapping_sub(10)), Instant(u64::MAX - 1)));
    }
}
