//! Per-CPU dispatcher: two run queues (main/sub), a sorted callout list, and
//! the register/remove/wakeup operations that feed them.

use alloc::boxed::Box;
use core::cell::Cell;
use core::ptr::NonNull;

use crate::cpu::CpuId;
use crate::ipi::IpiControl;
use crate::sync::IntSpinLock;
use crate::time::TimeSource;

use super::callout::{Callout, CalloutState};
use super::task::{Status, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskQueueState {
    NotStarted,
    NotRunning,
    Running,
    Slept,
}

struct TaskStruct {
    lock: IntSpinLock<()>,
    dlock: IntSpinLock<()>,
    top: Cell<NonNull<Task>>,
    bottom: Cell<NonNull<Task>>,
    top_sub: Cell<NonNull<Task>>,
    bottom_sub: Cell<NonNull<Task>>,
    dtop: NonNull<Callout>,
    state: Cell<TaskQueueState>,
}

// SAFETY: the `Cell<NonNull<_>>`/`NonNull` fields above are only ever
// mutated while holding `lock` or `dlock`; that's the entire purpose of
// this struct's two `IntSpinLock`s.
unsafe impl Sync for TaskStruct {}
unsafe impl Send for TaskStruct {}

impl TaskStruct {
    fn new() -> Self {
        let top: &'static Task = Box::leak(Box::new(Task::guard()));
        let top_sub: &'static Task = Box::leak(Box::new(Task::guard()));
        let dtop: &'static Callout = Box::leak(Box::new(Callout::new()));
        Self {
            lock: IntSpinLock::new(()),
            dlock: IntSpinLock::new(()),
            top: Cell::new(NonNull::from(top)),
            bottom: Cell::new(NonNull::from(top)),
            top_sub: Cell::new(NonNull::from(top_sub)),
            bottom_sub: Cell::new(NonNull::from(top_sub)),
            dtop: NonNull::from(dtop),
            state: Cell::new(TaskQueueState::NotStarted),
        }
    }
}

/// Owns every per-CPU queue/state and implements the scheduling algorithm.
///
/// `N` bounds how many CPUs this controller is sized for; a consumer picks
/// it to match [`crate::cpu::CpuPlatform::how_many_cpus`].
pub struct TaskController<const N: usize> {
    structs: [TaskStruct; N],
}

impl<const N: usize> TaskController<N> {
    pub fn new() -> Self {
        Self {
            structs: core::array::from_fn(|_| TaskStruct::new()),
        }
    }

    fn ts(&self, cpu: usize) -> &TaskStruct {
        &self.structs[cpu]
    }

    /// Links `task` onto `cpuid`'s sub queue. Idempotent: a task already
    /// waiting in a queue is left alone.
    pub fn register(&self, cpuid: CpuId, task: &'static Task, ipi: &dyn IpiControl) {
        if !cpuid.is_valid() {
            return;
        }
        let raw = cpuid.raw() as usize;
        let ts = self.ts(raw);
        {
            let _guard = ts.lock.lock(raw as i64);
            if task.status() == Status::WaitingInQueue {
                return;
            }
            task.set_cpu_id(raw as i64);
            task.set_next(None);
            task.set_status(Status::WaitingInQueue);

            let bottom_sub = ts.bottom_sub.get();
            unsafe {
                bottom_sub.as_ref().set_next(Some(NonNull::from(task)));
            }
            task.set_prev(Some(bottom_sub));
            ts.bottom_sub.set(NonNull::from(task));
        }
        self.force_wakeup(cpuid, ipi);
    }

    /// Unlinks `task` from whichever queue it's in. A task that's
    /// `Running` or already `OutOfQueue` is left as-is.
    pub fn remove(&self, task: &Task) {
        assert!(task.status() != Status::Guard, "cannot remove a guard task");
        let raw = task.cpu_id() as usize;
        let ts = self.ts(raw);
        let _guard = ts.lock.lock(raw as i64);
        if task.status() == Status::WaitingInQueue {
            let next = task.next();
            let prev = task.prev().expect("queued task always has a prev link");

            task.set_next(None);
            task.set_prev(None);

            unsafe {
                prev.as_ref().set_next(next);
            }
            match next {
                None => {
                    let self_ptr = NonNull::from(task);
                    if ts.bottom.get() == self_ptr {
                        ts.bottom.set(prev);
                    } else if ts.bottom_sub.get() == self_ptr {
                        ts.bottom_sub.set(prev);
                    } else {
                        panic!("removed task wasn't the tail of either queue");
                    }
                }
                Some(next) => unsafe {
                    next.as_ref().set_prev(Some(prev));
                },
            }
        }
        task.set_status(Status::OutOfQueue);
    }

    /// Inserts `callout` into its CPU's sorted-by-deadline list.
    ///
    /// Inserts immediately before the first node whose deadline is later
    /// than `callout`'s, appending at the end otherwise — this keeps the
    /// list sorted ascending by fire time, which the dispatcher's drain
    /// step relies on to stop at the first not-yet-due entry.
    pub fn register_callout(&self, callout: &'static Callout, time: &dyn TimeSource, ipi: &dyn IpiControl) {
        let cpuid = CpuId::new(callout.cpu_id());
        if !cpuid.is_valid() {
            return;
        }
        let raw = cpuid.raw() as usize;
        let ts = self.ts(raw);
        {
            let _dguard = ts.dlock.lock(raw as i64);
            let mut guarded = callout.guarded.lock(raw as i64);
            let mut cursor = ts.dtop;
            loop {
                let next = unsafe { cursor.as_ref().guarded.lock(raw as i64).next };
                match next {
                    None => {
                        guarded.state = CalloutState::CalloutQueue;
                        guarded.next = None;
                        unsafe {
                            cursor.as_ref().guarded.lock(raw as i64).next = Some(NonNull::from(callout));
                        }
                        break;
                    }
                    Some(next_ptr) => {
                        let next_time = unsafe { next_ptr.as_ref().guarded.lock(raw as i64).time };
                        if time.is_greater(next_time, guarded.time) {
                            guarded.state = CalloutState::CalloutQueue;
                            guarded.next = Some(next_ptr);
                            unsafe {
                                cursor.as_ref().guarded.lock(raw as i64).next = Some(NonNull::from(callout));
                            }
                            break;
                        }
                        cursor = next_ptr;
                    }
                }
            }
        }
        self.force_wakeup(cpuid, ipi);
    }

    /// Unlinks `callout` from wherever it currently sits (sorted list or
    /// promoted onto the run queue) and marks it stopped.
    pub fn cancel_callout(&self, callout: &'static Callout) {
        let raw = callout.cpu_id() as usize;
        let state = callout.guarded.lock(raw as i64).state;
        match state {
            CalloutState::CalloutQueue => {
                let ts = self.ts(raw);
                let _dguard = ts.dlock.lock(raw as i64);
                let mut cursor = ts.dtop;
                loop {
                    let next = unsafe { cursor.as_ref().guarded.lock(raw as i64).next };
                    match next {
                        None => break,
                        Some(next_ptr) if next_ptr == NonNull::from(callout) => {
                            let after = callout.guarded.lock(raw as i64).next;
                            unsafe {
                                cursor.as_ref().guarded.lock(raw as i64).next = after;
                            }
                            break;
                        }
                        Some(next_ptr) => cursor = next_ptr,
                    }
                }
                callout.guarded.lock(raw as i64).next = None;
            }
            CalloutState::TaskQueue => {
                self.remove(&callout.task);
            }
            CalloutState::Handling | CalloutState::Stopped => {}
        }
        callout.guarded.lock(raw as i64).state = CalloutState::Stopped;
    }

    /// Interrupts `cpuid` if it is currently parked waiting for work.
    pub fn force_wakeup(&self, cpuid: CpuId, ipi: &dyn IpiControl) {
        if !cpuid.is_valid() {
            return;
        }
        let raw = cpuid.raw() as usize;
        if self.ts(raw).state.get() == TaskQueueState::Slept {
            ipi.send_ipi(cpuid);
        }
    }

    /// Runs exactly one outer iteration of the dispatch loop for `cpuid`:
    /// arm/drain at most one expired callout, drain the main queue,
    /// swap main/sub if main emptied, and decide whether to sleep.
    ///
    /// Returns `true` if the CPU should now go idle (state is `Slept`),
    /// `false` if there's more work ready immediately.
    pub fn run_once(&self, cpuid: CpuId, time: &dyn TimeSource, ipi: &dyn IpiControl) -> bool {
        let raw = cpuid.raw() as usize;
        let ts = self.ts(raw);

        let oldstate = {
            let _guard = ts.lock.lock(raw as i64);
            let oldstate = ts.state.get();
            assert!(
                matches!(oldstate, TaskQueueState::NotRunning | TaskQueueState::Slept)
                    || oldstate == TaskQueueState::NotStarted,
                "run_once called on a CPU that's already Running"
            );
            ts.state.set(TaskQueueState::Running);
            oldstate
        };

        // Drain at most one expired callout per outer iteration: only the
        // head of the sorted list is ever examined here. A failed trylock
        // retries against the same head rather than skipping ahead, since
        // skipping would reorder delivery relative to the sort key.
        if oldstate == TaskQueueState::NotRunning || oldstate == TaskQueueState::NotStarted {
            let deadline = time.counter_after(time.read_main_counter(), crate::config::TASK_EXECUTION_INTERVAL);
            loop {
                let head: &'static Callout = {
                    let _dguard = ts.dlock.lock(raw as i64);
                    let head = unsafe { ts.dtop.as_ref().guarded.lock(raw as i64).next };
                    let Some(head_ptr) = head else { break };
                    let head_callout: &'static Callout = unsafe { head_ptr.as_ref() };
                    let head_time = head_callout.guarded.lock(raw as i64).time;
                    if time.is_greater(head_time, deadline) {
                        break;
                    }
                    let Some(mut obj_guard) = head_callout.guarded.try_lock(raw as i64) else {
                        continue;
                    };
                    unsafe {
                        ts.dtop.as_ref().guarded.lock(raw as i64).next = obj_guard.next;
                    }
                    obj_guard.next = None;
                    obj_guard.state = CalloutState::TaskQueue;
                    drop(obj_guard);
                    head_callout
                };
                self.register(cpuid, &head.task, ipi);
                break;
            }
        }

        loop {
            loop {
                let task = {
                    let _guard = ts.lock.lock(raw as i64);
                    let top = ts.top.get();
                    let next = unsafe { top.as_ref().next() };
                    let Some(task_ptr) = next else {
                        assert_eq!(ts.bottom.get(), top, "main queue head/tail mismatch while empty");
                        break;
                    };
                    let task_ref = unsafe { task_ptr.as_ref() };
                    unsafe {
                        top.as_ref().set_next(task_ref.next());
                    }
                    match task_ref.next() {
                        None => {
                            assert_eq!(ts.bottom.get(), task_ptr, "removed non-tail with no successor");
                            ts.bottom.set(top);
                        }
                        Some(after) => unsafe {
                            after.as_ref().set_prev(Some(top));
                        },
                    }
                    assert_eq!(task_ref.status(), Status::WaitingInQueue);
                    task_ref.set_status(Status::Running);
                    task_ref.set_next(None);
                    task_ref.set_prev(None);
                    task_ptr
                };

                unsafe { task.as_ref().execute() };

                {
                    let _guard = ts.lock.lock(raw as i64);
                    let task_ref = unsafe { task.as_ref() };
                    if task_ref.status() == Status::Running {
                        task_ref.set_status(Status::OutOfQueue);
                    }
                }
            }

            let _guard = ts.lock.lock(raw as i64);
            let main_empty = unsafe { ts.top.get().as_ref().next().is_none() };
            let sub_empty = unsafe { ts.top_sub.get().as_ref().next().is_none() };
            if main_empty && sub_empty {
                ts.state.set(TaskQueueState::Slept);
                break;
            }

            let top = ts.top.get();
            let top_sub = ts.top_sub.get();
            ts.top.set(top_sub);
            ts.top_sub.set(top);

            let bottom = ts.bottom.get();
            let bottom_sub = ts.bottom_sub.get();
            ts.bottom.set(bottom_sub);
            ts.bottom_sub.set(bottom);

            // A callout that becomes due while this swap-and-drain loop
            // keeps running won't be picked up until the next NotRunning
            // pass; see the crate-level note on this in DESIGN.md.
        }

        assert_eq!(ts.state.get(), TaskQueueState::Slept);

        {
            let _dguard = ts.dlock.lock(raw as i64);
            let pending = unsafe { ts.dtop.as_ref().guarded.lock(raw as i64).next.is_some() };
            if pending {
                ts.state.set(TaskQueueState::NotRunning);
            }
        }

        ts.state.get() == TaskQueueState::Slept
    }

}

impl<const N: usize> Default for TaskController<N> {
    fn default() -> Self {
        Self::new()
    }
}
