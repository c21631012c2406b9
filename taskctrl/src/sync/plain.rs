// =============================================================================
// taskctrl — Plain Spinlock
// =============================================================================
//
// A non-interrupt-disabling lock for data that is never touched from
// interrupt context. Built directly on `spin::Mutex` rather than
// reimplementing a spin loop — there's nothing this crate needs from a
// custom implementation that `spin::Mutex` doesn't already give us.
// =============================================================================

pub use spin::{Mutex as SpinLock, MutexGuard as SpinLockGuard};
