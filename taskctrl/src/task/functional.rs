//! A self-rescheduling object that runs its function while a predicate
//! holds, staying registered with the scheduler only while there's work.
//!
//! `Functional<L>` is parameterized over the lock flavor guarding its
//! internal "am I already scheduled" flag: [`crate::sync::SpinLock`] for
//! callers that are never themselves in interrupt context, or
//! [`crate::sync::IntSpinLock`] for callers (e.g. an interrupt handler
//! pushing onto a `FunctionalQueue`) that might be.

use alloc::boxed::Box;
use core::cell::UnsafeCell;

use super::task::Task;
use crate::queue::{IntQueue, Linked, Queue};

/// A lock that can guard a `bool` flag for [`Functional`]. Implemented by
/// both [`crate::sync::SpinLock`] and [`crate::sync::IntSpinLock`] so
/// `Functional` doesn't care which flavor it's built on.
pub trait FunctionalLock: Default {
    fn with_flag<R>(&self, owner: i64, f: impl FnOnce(&mut bool) -> R) -> R;
}

impl FunctionalLock for crate::sync::SpinLock<bool> {
    fn with_flag<R>(&self, _owner: i64, f: impl FnOnce(&mut bool) -> R) -> R {
        f(&mut self.lock())
    }
}

impl FunctionalLock for crate::sync::IntSpinLock<bool> {
    fn with_flag<R>(&self, owner: i64, f: impl FnOnce(&mut bool) -> R) -> R {
        f(&mut self.lock(owner))
    }
}

type UserFn = dyn FnMut() + Send;
type ShouldFn = dyn Fn() -> bool + Send;

/// Re-registers itself with the scheduler on [`Functional::wakeup`] iff it
/// wasn't already pending, and keeps re-registering after each run as long
/// as `should_func` still returns `true`.
///
/// At most one instance of this object's handler is ever in flight: once
/// `wakeup` has moved it from not-functioning to functioning, further
/// `wakeup` calls are no-ops until the handler observes `should_func() ==
/// false` and stands down.
pub struct Functional<L: FunctionalLock> {
    pub(crate) task: Task,
    functioning: L,
    cpu_id: i64,
    func: UnsafeCell<Option<Box<UserFn>>>,
    should_func: UnsafeCell<Option<Box<ShouldFn>>>,
}

unsafe impl<L: FunctionalLock> Send for Functional<L> {}
unsafe impl<L: FunctionalLock> Sync for Functional<L> {}

impl<L: FunctionalLock> Functional<L> {
    pub fn new(cpu_id: i64) -> Self {
        Self {
            task: Task::new(),
            functioning: L::default(),
            cpu_id,
            func: UnsafeCell::new(None),
            should_func: UnsafeCell::new(None),
        }
    }

    pub fn cpu_id(&self) -> i64 {
        self.cpu_id
    }

    /// Sets the function to run each time this object fires, and the
    /// predicate that decides whether it should fire again immediately
    /// after. Both must be set before the first [`Functional::wakeup`].
    pub fn init<F, S>(&self, func: F, should_func: S)
    where
        F: FnMut() + Send + 'static,
        S: Fn() -> bool + Send + 'static,
    {
        unsafe {
            *self.func.get() = Some(Box::new(func));
            *self.should_func.get() = Some(Box::new(should_func));
        }
    }

    fn should_func(&self) -> bool {
        let slot = unsafe { &*self.should_func.get() };
        slot.as_ref().is_some_and(|f| f())
    }

    fn run_func(&self) {
        let slot = unsafe { &mut *self.func.get() };
        if let Some(f) = slot {
            f();
        }
    }

    /// Returns `true` the moment this transitions not-functioning ->
    /// functioning — the caller should register the embedded task with the
    /// scheduler exactly when this returns `true`. A `false` return means
    /// an instance is already in flight and will pick up the new work
    /// itself once it re-checks `should_func`.
    pub(crate) fn wakeup_bump(&self) -> bool {
        self.functioning.with_flag(self.cpu_id, |functioning| {
            if *functioning {
                false
            } else {
                *functioning = true;
                true
            }
        })
    }

    /// Runs the user function once, then stands down (clearing the
    /// functioning flag) if `should_func` no longer holds. Returns `true`
    /// if the caller should re-register the task immediately.
    pub(crate) fn run_and_requeue(&self) -> bool {
        self.run_func();
        self.functioning.with_flag(self.cpu_id, |functioning| {
            if self.should_func() {
                true
            } else {
                *functioning = false;
                false
            }
        })
    }
}

/// A [`Functional`] wrapping a [`Queue`]: `push` enqueues a payload, and
/// `should_func` should be `queue.is_empty() == false`. The canonical
/// producer call is `push` immediately followed by
/// [`crate::task::Runtime::wakeup`] on `functional`.
pub struct FunctionalQueue<T, L: FunctionalLock> {
    pub queue: Queue<T>,
    pub functional: Functional<L>,
}

impl<T, L: FunctionalLock> FunctionalQueue<T, L> {
    pub fn new(cpu_id: i64) -> Self {
        Self {
            queue: Queue::new(),
            functional: Functional::new(cpu_id),
        }
    }

    pub fn push(&self, item: T) {
        self.queue.push(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A [`Functional`] wrapping an [`IntQueue`], for intrusively-linked
/// payloads that must never allocate on push (e.g. draining a list of
/// pre-existing interrupt-context records).
pub struct FunctionalIntQueue<T: Linked, L: FunctionalLock> {
    pub queue: IntQueue<T>,
    pub functional: Functional<L>,
}

impl<T: Linked, L: FunctionalLock> FunctionalIntQueue<T, L> {
    pub fn new(cpu_id: i64) -> Self {
        Self {
            queue: IntQueue::new(),
            functional: Functional::new(cpu_id),
        }
    }

    /// # Safety
    /// Same contract as [`IntQueue::push`].
    pub unsafe fn push(&self, node: core::ptr::NonNull<T>) {
        unsafe { self.queue.push(node, self.functional.cpu_id()) }
    }

    pub fn pop(&self) -> Option<core::ptr::NonNull<T>> {
        self.queue.pop(self.functional.cpu_id())
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty(self.functional.cpu_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SpinLock as PlainLock;
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[test]
    fn wakeup_bump_only_fires_once_while_functioning() {
        let f: Functional<PlainLock<bool>> = Functional::new(0);
        assert!(f.wakeup_bump());
        assert!(!f.wakeup_bump(), "already functioning, should not re-fire");
    }

    #[test]
    fn run_and_requeue_stands_down_when_predicate_false() {
        let f: Functional<PlainLock<bool>> = Functional::new(0);
        let ran = AtomicU32::new(0);
        let pending = AtomicBool::new(true);
        f.init(
            || {
                ran.fetch_add(1, Ordering::Relaxed);
            },
            || false,
        );
        assert!(f.wakeup_bump());
        assert!(!f.run_and_requeue());
        assert_eq!(ran.load(Ordering::Relaxed), 1);
        assert!(f.wakeup_bump(), "should be re-armable after standing down");
        let _ = pending;
    }

    #[test]
    fn run_and_requeue_keeps_going_while_predicate_true() {
        let f: Functional<PlainLock<bool>> = Functional::new(0);
        let remaining = core::cell::Cell::new(3i32);
        f.init(|| {}, || remaining.get() > 0);
        assert!(f.wakeup_bump());
        remaining.set(1);
        assert!(f.run_and_requeue());
        remaining.set(0);
        assert!(!f.run_and_requeue());
    }

    #[test]
    fn functional_queue_push_pop_fifo() {
        let q: FunctionalQueue<u32, PlainLock<bool>> = FunctionalQueue::new(0);
        q.push(1);
        q.push(2);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert!(q.is_empty());
    }
}
