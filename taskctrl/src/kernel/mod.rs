//! Real hardware backends for the platform traits, built only under the
//! `kernel` feature.
//!
//! None of this is required to use `taskctrl` — every trait in
//! [`crate::cpu`], [`crate::time`], [`crate::ipi`] has a hosted/test double
//! already. This module exists for the one consumer that actually runs on
//! bare metal: it wires [`crate::ipi::IpiControl`] to a real Local APIC IPI
//! and [`crate::time::TimeSource`] to a tick counter driven by the APIC
//! timer. CPU enumeration itself stays a pure trait — which core is "this
//! one" and how many cores exist is board bring-up the consumer kernel
//! already does, not something this crate reimplements.

pub mod clock;
pub mod ipi;
pub mod time;

pub use ipi::ApicIpiControl;
pub use time::TickTimeSource;

/// Halts the calling CPU until the next interrupt, the idle step the
/// dispatcher's run loop takes when there's no work left this round.
///
/// # Safety
/// Interrupts must already be enabled, or this call never returns.
#[inline(always)]
pub fn halt() {
    unsafe {
        core::arch::asm!("hlt", options(nomem, nostack));
    }
}
