//! Monotonic tick counter driven by the Local APIC timer.
//!
//! The consumer kernel's APIC timer interrupt handler calls [`tick`] once
//! per firing (see `crate::config::TASK_EXECUTION_INTERVAL` for the period
//! it should be armed at); [`now`] is what [`super::TickTimeSource`] reads.

use core::sync::atomic::{AtomicU64, Ordering};

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Advances the tick counter by one. Call this from the timer ISR only.
#[inline]
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Reads the current tick count.
#[inline]
pub fn now() -> u64 {
    TICKS.load(Ordering::Relaxed)
}
