// =============================================================================
// taskctrl — Interrupt-Aware Spinlock
// =============================================================================
//
// Mutual exclusion for data that a dispatcher loop and an interrupt handler
// might both touch on the same core. Unlike a plain spinlock, acquiring this
// lock disables local interrupts first — otherwise an interrupt firing while
// the lock is held could try to re-enter the same lock and spin forever.
//
// ALGORITHM: a single `u32` flag toggles even (free) / odd (locked) via
// compare-and-swap. This is deliberately not a ticket lock: the scheduler
// only ever expects short, uncontended critical sections (per-CPU queues,
// callout lists), so FIFO fairness isn't worth the extra cache line.
//
// Lock() order: disable interrupts, then CAS the flag. If the CAS loses the
// race, interrupts are restored before retrying (so a spinning core doesn't
// sit with interrupts off indefinitely).
//
// Unlock() order matters: the owner id is cleared BEFORE interrupts are
// restored, and only after that is the flag incremented to release the lock.
// This guarantees no other core can observe a `lock()` as having succeeded
// against a guard that still looks owned.
//
// Non-reentrant: calling `lock()` again for the same owner while the flag is
// already held is a programmer error (would deadlock against yourself) and
// is an unconditional `assert!`, not a `debug_assert!` — kernel-fatal.
// =============================================================================

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicI64, AtomicU32, Ordering};

const UNOWNED: i64 = -1;

/// A spinlock that disables local interrupts while held.
///
/// `T` must be `Send`: the lock is how ownership crosses core boundaries.
pub struct IntSpinLock<T> {
    flag: AtomicU32,
    owner: AtomicI64,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for IntSpinLock<T> {}
unsafe impl<T: Send> Sync for IntSpinLock<T> {}

impl<T> IntSpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            flag: AtomicU32::new(0),
            owner: AtomicI64::new(UNOWNED),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, disabling interrupts on the current core.
    ///
    /// `owner` identifies the calling CPU for debugging and for the
    /// self-deadlock assertion below. Callers that don't track a CPU id
    /// (e.g. single-core test doubles) can pass any stable non-negative id.
    pub fn lock(&self, owner: i64) -> IntSpinLockGuard<'_, T> {
        loop {
            let current = self.flag.load(Ordering::Relaxed);
            if current % 2 == 1 {
                assert!(
                    self.owner.load(Ordering::Relaxed) != owner,
                    "IntSpinLock: reentrant lock by the same owner would deadlock"
                );
                while self.flag.load(Ordering::Relaxed) % 2 == 1 {
                    core::hint::spin_loop();
                }
                continue;
            }

            let was_enabled = interrupts_enabled();
            disable_interrupts();

            match self.flag.compare_exchange(
                current,
                current.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.owner.store(owner, Ordering::Relaxed);
                    return IntSpinLockGuard {
                        lock: self,
                        irq_was_enabled: was_enabled,
                    };
                }
                Err(_) => {
                    if was_enabled {
                        enable_interrupts();
                    }
                }
            }
        }
    }

    /// Attempts to acquire the lock without spinning.
    pub fn try_lock(&self, owner: i64) -> Option<IntSpinLockGuard<'_, T>> {
        let current = self.flag.load(Ordering::Relaxed);
        if current % 2 == 1 {
            return None;
        }

        let was_enabled = interrupts_enabled();
        disable_interrupts();

        match self.flag.compare_exchange(
            current,
            current.wrapping_add(1),
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                self.owner.store(owner, Ordering::Relaxed);
                Some(IntSpinLockGuard {
                    lock: self,
                    irq_was_enabled: was_enabled,
                })
            }
            Err(_) => {
                if was_enabled {
                    enable_interrupts();
                }
                None
            }
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for IntSpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct IntSpinLockGuard<'a, T> {
    lock: &'a IntSpinLock<T>,
    irq_was_enabled: bool,
}

impl<T> Deref for IntSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IntSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IntSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.owner.store(UNOWNED, Ordering::Relaxed);
        if self.irq_was_enabled {
            enable_interrupts();
        }
        self.lock.flag.fetch_add(1, Ordering::Release);
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn interrupts_enabled() -> bool {
    let rflags: u64;
    unsafe {
        core::arch::asm!(
            "pushfq",
            "pop {}",
            out(reg) rflags,
            options(nomem, preserves_flags)
        );
    }
    rflags & (1 << 9) != 0
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn disable_interrupts() {
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn enable_interrupts() {
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack));
    }
}

// Hosted (test) builds run on whatever arch `cargo test` uses and never
// actually touch hardware interrupts; model the flag with a thread-local
// so the self-deadlock and ordering assertions above still mean something
// under test.
#[cfg(not(target_arch = "x86_64"))]
std::thread_local! {
    static IRQ_ENABLED: core::cell::Cell<bool> = const { core::cell::Cell::new(true) };
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
fn interrupts_enabled() -> bool {
    IRQ_ENABLED.with(|c| c.get())
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
fn disable_interrupts() {
    IRQ_ENABLED.with(|c| c.set(false));
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
fn enable_interrupts() {
    IRQ_ENABLED.with(|c| c.set(true));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutual_exclusion() {
        let lock = IntSpinLock::new(0u32);
        {
            let mut guard = lock.lock(0);
            *guard += 1;
        }
        let guard = lock.lock(1);
        assert_eq!(*guard, 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = IntSpinLock::new(());
        let _guard = lock.lock(0);
        assert!(lock.try_lock(1).is_none());
    }

    #[test]
    #[should_panic(expected = "reentrant")]
    fn reentrant_lock_by_same_owner_panics() {
        let lock = IntSpinLock::new(());
        let _guard = lock.lock(7);
        let _ = lock.lock(7);
    }
}
