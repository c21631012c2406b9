//! Cooperative task scheduling: the per-CPU dispatcher, deferred callouts,
//! and the two convenience patterns (`Functional`, `CountableTask`) built on
//! top of it.

pub mod callout;
pub mod controller;
pub mod countable;
pub mod functional;
pub mod task;

pub use callout::{Callout, CalloutState};
pub use controller::TaskController;
pub use countable::CountableTask;
pub use functional::{Functional, FunctionalIntQueue, FunctionalQueue};
pub use task::{Status, Task};

use alloc::boxed::Box;

use crate::cpu::{CpuId, CpuPlatform};
use crate::ipi::IpiControl;
use crate::time::TimeSource;

/// The scheduling context a whole system shares: one [`TaskController`] plus
/// the three platform collaborators it needs to drive it
/// ([`CpuPlatform`], [`TimeSource`], [`IpiControl`]).
///
/// A consumer builds one of these once at startup (typically
/// `Box::leak`ed, or placed in a `static` behind a `spin::Once`) and hands
/// out `&'static Runtime` to every `Callout`/`CountableTask`/`Functional`
/// it creates, since their handlers need to call back into the scheduler
/// when they fire.
pub struct Runtime<const N: usize> {
    pub platform: &'static dyn CpuPlatform,
    pub time: &'static dyn TimeSource,
    pub ipi: &'static dyn IpiControl,
    pub controller: TaskController<N>,
}

impl<const N: usize> Runtime<N> {
    pub fn new(
        platform: &'static dyn CpuPlatform,
        time: &'static dyn TimeSource,
        ipi: &'static dyn IpiControl,
    ) -> Self {
        Self {
            platform,
            time,
            ipi,
            controller: TaskController::new(),
        }
    }

    /// Runs one outer dispatch iteration for the calling CPU. See
    /// [`TaskController::run_once`].
    pub fn run_once(&self) -> bool {
        let cpuid = self.platform.current_cpu_id();
        self.controller.run_once(cpuid, self.time, self.ipi)
    }

    /// Runs the dispatch loop forever, idling between iterations that find
    /// no more immediate work. `idle` is called once per iteration that
    /// goes to sleep (`hlt` on real hardware, a short poll in userspace).
    pub fn run(&self, idle: impl Fn()) -> ! {
        loop {
            if self.run_once() {
                idle();
            }
        }
    }

    pub fn register(&'static self, task: &'static Task, cpuid: CpuId) {
        self.controller.register(cpuid, task, self.ipi);
    }

    pub fn remove(&'static self, task: &Task) {
        self.controller.remove(task);
    }

    /// Builds a new, heap-leaked [`Callout`] wired to call back into this
    /// runtime when it fires or needs to re-check its deadline.
    pub fn new_callout(&'static self) -> &'static Callout {
        let callout: &'static Callout = Box::leak(Box::new(Callout::new()));
        callout.task.set_func(move |_| {
            if self.time.is_time_passed(callout.deadline()) {
                callout.enter_handling();
                callout.run_user_handler();
                callout.enter_stopped();
            } else {
                self.controller
                    .register(self.platform.current_cpu_id(), &callout.task, self.ipi);
            }
        });
        callout
    }

    /// Arms `callout` to fire `micros` ticks from now on the calling CPU.
    pub fn set_callout_handler(&'static self, callout: &'static Callout, micros: u64) {
        self.set_callout_handler_on(callout, self.platform.current_cpu_id(), micros);
    }

    /// Arms `callout` to fire `micros` ticks from now on `cpuid`.
    pub fn set_callout_handler_on(&'static self, callout: &'static Callout, cpuid: CpuId, micros: u64) {
        let owner = cpuid.raw();
        let deadline = self.time.counter_after(self.time.read_main_counter(), micros);
        {
            let mut guarded = callout.guarded.lock(owner);
            guarded.time = deadline;
        }
        callout.set_cpu_id(owner);
        self.controller.register_callout(callout, self.time, self.ipi);
    }

    pub fn cancel_callout(&self, callout: &'static Callout) {
        self.controller.cancel_callout(callout);
    }

    /// Builds a new, heap-leaked [`CountableTask`] bound to `cpuid`, wiring
    /// its embedded task so that draining it always acks exactly one
    /// [`Runtime::inc`] and re-registers itself if more arrived meanwhile.
    pub fn new_countable_task(&'static self, cpuid: CpuId) -> &'static CountableTask {
        let ct: &'static CountableTask = Box::leak(Box::new(CountableTask::new(cpuid.raw())));
        ct.task.set_func(move |_| {
            if ct.ack() {
                self.controller.register(cpuid, &ct.task, self.ipi);
            }
        });
        ct
    }

    /// Increments `ct`'s pending count, registering its task with the
    /// scheduler iff this is the transition from zero to one pending.
    pub fn inc(&'static self, ct: &'static CountableTask) {
        if ct.bump() {
            let cpuid = CpuId::new(ct.cpu_id());
            self.controller.register(cpuid, &ct.task, self.ipi);
        }
    }

    /// Builds a new, heap-leaked [`Functional`] bound to `cpuid`. `func` is
    /// the work to perform; `should_func` decides whether it should run
    /// again immediately after each invocation.
    pub fn new_functional<L, F, S>(
        &'static self,
        cpuid: CpuId,
        func: F,
        should_func: S,
    ) -> &'static Functional<L>
    where
        L: functional::FunctionalLock + 'static,
        F: FnMut() + Send + 'static,
        S: Fn() -> bool + Send + 'static,
    {
        let f: &'static Functional<L> = Box::leak(Box::new(Functional::new(cpuid.raw())));
        f.init(func, should_func);
        f.task.set_func(move |_| {
            if f.run_and_requeue() {
                self.controller.register(cpuid, &f.task, self.ipi);
            }
        });
        f
    }

    /// Registers `functional`'s task with the scheduler iff it isn't
    /// already functioning.
    pub fn wakeup<L: functional::FunctionalLock>(&'static self, functional: &'static Functional<L>) {
        if functional.wakeup_bump() {
            let cpuid = CpuId::new(functional.cpu_id());
            self.controller.register(cpuid, &functional.task, self.ipi);
        }
    }

    /// Builds a [`FunctionalQueue`] whose drain handler pops and hands
    /// each item to `drain_one` until the queue is empty.
    pub fn new_functional_queue<T, L, F>(
        &'static self,
        cpuid: CpuId,
        mut drain_one: F,
    ) -> &'static FunctionalQueue<T, L>
    where
        T: Send + 'static,
        L: functional::FunctionalLock + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let fq: &'static FunctionalQueue<T, L> = Box::leak(Box::new(FunctionalQueue::new(cpuid.raw())));
        fq.functional.init(
            move || {
                if let Some(item) = fq.pop() {
                    drain_one(item);
                }
            },
            move || !fq.is_empty(),
        );
        fq.functional.task.set_func(move |_| {
            if fq.functional.run_and_requeue() {
                self.controller.register(cpuid, &fq.functional.task, self.ipi);
            }
        });
        fq
    }

    /// Pushes `item` onto `fq` and wakes its drain handler.
    pub fn push_and_wakeup<T, L: functional::FunctionalLock>(&'static self, fq: &'static FunctionalQueue<T, L>, item: T) {
        fq.push(item);
        self.wakeup(&fq.functional);
    }
}
