// =============================================================================
// taskctrl — Synchronization Primitives
// =============================================================================
//
// Two lock flavors are provided, matching the two the scheduler itself
// distinguishes between:
//
//   int_spinlock.rs — `IntSpinLock<T>`, disables local interrupts for the
//                      duration of the critical section. Used anywhere a
//                      task dispatcher or interrupt handler might also touch
//                      the protected data (the per-CPU task queues, the
//                      callout queue, `Task`/`Callout` state).
//   plain.rs        — `SpinLock<T>`, a thin re-export of `spin::Mutex`. Used
//                      where the caller is never itself running in interrupt
//                      context (e.g. the "regular" flavor of `Functional<L>`).
//
// NEVER acquire an `IntSpinLock` while holding a plain `SpinLock` that an
// interrupt handler might also need — the plain lock does not disable
// interrupts, so a handler spinning on it while the held core is inside an
// `IntSpinLock` critical section would deadlock.
// =============================================================================

pub mod int_spinlock;
pub mod plain;

pub use int_spinlock::{IntSpinLock, IntSpinLockGuard};
pub use plain::{SpinLock, SpinLockGuard};
