//! Monotonic timer collaborator.
//!
//! The scheduler needs to compare "now" against a callout's fire time and
//! to ask a platform timer to notify it after some period. Neither the
//! clock source nor the comparison arithmetic for wraparound is something
//! this crate can assume about a specific board, so both are a trait.

/// An opaque, monotonically non-decreasing counter value.
///
/// Two `Instant`s are only meaningfully compared through
/// [`TimeSource::is_greater`] — the crate never assumes a particular
/// wraparound width or tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instant(pub u64);

pub trait TimeSource {
    /// Reads the current value of the platform's main counter.
    fn read_main_counter(&self) -> Instant;

    /// Computes the counter value `period` ticks after `from`.
    fn counter_after(&self, from: Instant, period: u64) -> Instant;

    /// `true` if `lhs` is strictly after `rhs`.
    fn is_greater(&self, lhs: Instant, rhs: Instant) -> bool;

    /// `true` if `deadline` has already passed relative to now.
    fn is_time_passed(&self, deadline: Instant) -> bool {
        let now = self.read_main_counter();
        !self.is_greater(deadline, now)
    }
}

/// A `TimeSource` backed by a plain `u64` tick count with no wraparound
/// handling, for hosted tests and userspace builds where the platform timer
/// is not available.
#[derive(Debug, Default)]
pub struct LinearTimeSource;

impl TimeSource for LinearTimeSource {
    fn read_main_counter(&self) -> Instant {
        Instant(0)
    }

    fn counter_after(&self, from: Instant, period: u64) -> Instant {
        Instant(from.0.wrapping_add(period))
    }

    fn is_greater(&self, lhs: Instant, rhs: Instant) -> bool {
        lhs.0 > rhs.0
    }
}

/// A `TimeSource` whose "now" is set explicitly, for deterministic tests of
/// callout ordering and expiry.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: core::cell::Cell<u64>,
}

impl ManualTimeSource {
    pub const fn new(start: u64) -> Self {
        Self {
            now: core::cell::Cell::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.set(now);
    }

    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get().wrapping_add(ticks));
    }
}

impl TimeSource for ManualTimeSource {
    fn read_main_counter(&self) -> Instant {
        Instant(self.now.get())
    }

    fn counter_after(&self, from: Instant, period: u64) -> Instant {
        Instant(from.0.wrapping_add(period))
    }

    fn is_greater(&self, lhs: Instant, rhs: Instant) -> bool {
        lhs.0 > rhs.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_time_passed_uses_is_greater() {
        let ts = LinearTimeSource;
        assert!(ts.is_time_passed(Instant(0)));
    }

    #[test]
    fn manual_time_source_tracks_advances() {
        let ts = ManualTimeSource::new(10);
        assert!(!ts.is_time_passed(Instant(20)));
        ts.advance(15);
        assert!(ts.is_time_passed(Instant(20)));
    }
}
