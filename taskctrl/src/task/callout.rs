//! One-shot deferred tasks, sorted by fire time onto a per-CPU list and
//! promoted onto the ordinary run queue once their time has come.

use alloc::boxed::Box;
use core::cell::Cell;
use core::ptr::NonNull;

use crate::sync::IntSpinLock;
use crate::time::Instant;

use super::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalloutState {
    /// Linked into the sorted per-CPU callout list, not yet due.
    CalloutQueue,
    /// Promoted onto the normal run queue; due (or nearly due).
    TaskQueue,
    /// The handler is executing right now.
    Handling,
    /// Not scheduled.
    Stopped,
}

/// Fields only ever touched while holding [`Callout::lock`] — this is the
/// per-object lock, distinct from a controller's per-CPU `dlock` which
/// guards the shared list's head/`next` chain structurally.
pub(crate) struct Guarded {
    pub(crate) time: Instant,
    pub(crate) next: Option<NonNull<Callout>>,
    pub(crate) state: CalloutState,
}

// SAFETY: every access to a `Guarded` goes through `Callout::guarded`, an
// `IntSpinLock`, so there's never concurrent unsynchronized access despite
// the raw `NonNull` inside.
unsafe impl Send for Guarded {}

pub struct Callout {
    pub(crate) task: Task,
    pub(crate) guarded: IntSpinLock<Guarded>,
    cpu_id: Cell<i64>,
    func: core::cell::UnsafeCell<Option<Box<dyn FnMut() + Send>>>,
}

unsafe impl Send for Callout {}
unsafe impl Sync for Callout {}

impl Callout {
    pub const fn new() -> Self {
        Self {
            task: Task::new(),
            guarded: IntSpinLock::new(Guarded {
                time: Instant(0),
                next: None,
                state: CalloutState::Stopped,
            }),
            cpu_id: Cell::new(-1),
            func: core::cell::UnsafeCell::new(None),
        }
    }

    /// Sets the handler to run once the deadline passes. Can be called
    /// again after the callout has fired or been cancelled.
    pub fn init<F>(&self, f: F)
    where
        F: FnMut() + Send + 'static,
    {
        unsafe {
            *self.func.get() = Some(Box::new(f));
        }
    }

    pub fn cpu_id(&self) -> i64 {
        self.cpu_id.get()
    }

    pub(crate) fn set_cpu_id(&self, cpu_id: i64) {
        self.cpu_id.set(cpu_id);
    }

    pub fn is_handling(&self, owner: i64) -> bool {
        self.guarded.lock(owner).state == CalloutState::Handling
    }

    pub fn is_pending(&self, owner: i64) -> bool {
        !matches!(self.guarded.lock(owner).state, CalloutState::Stopped)
    }

    pub(crate) fn run_user_handler(&self) {
        let slot = unsafe { &mut *self.func.get() };
        if let Some(f) = slot {
            f();
        }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.guarded.lock(self.cpu_id()).time
    }

    pub(crate) fn enter_handling(&self) {
        self.guarded.lock(self.cpu_id()).state = CalloutState::Handling;
    }

    pub(crate) fn enter_stopped(&self) {
        self.guarded.lock(self.cpu_id()).state = CalloutState::Stopped;
    }
}

impl Default for Callout {
    fn default() -> Self {
        Self::new()
    }
}
