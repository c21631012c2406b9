#![cfg_attr(not(test), no_std)]
//! Per-CPU cooperative task scheduling, deferred callouts, and a hand-rolled
//! TCP client/server, built on interrupt-safe spinlocks and intrusive
//! queues.
//!
//! This crate assumes nothing about the machine it's running on beyond what
//! [`cpu::CpuPlatform`], [`time::TimeSource`], [`ipi::IpiControl`], and
//! [`net::NetDevice`] describe — CPU enumeration, a monotonic counter,
//! inter-processor interrupts, and a bound network interface are all
//! supplied by the consumer. The `kernel` feature adds concrete backends
//! for the first three against a Local APIC; nothing in this crate's
//! default configuration touches hardware, so the whole scheduler and
//! protocol stack can be driven from hosted tests.
//!
//! [`task::Runtime`] is the explicit context that ties one
//! [`task::TaskController`] to its three platform collaborators — there is
//! no global/static scheduler state anywhere in this crate; a consumer
//! builds a `Runtime` once and hands `&'static Runtime` to whoever needs to
//! register tasks or arm callouts.

extern crate alloc;

pub mod config;
pub mod cpu;
pub mod error;
pub mod ipi;
pub mod net;
pub mod queue;
pub mod sync;
pub mod task;
pub mod time;

#[cfg(feature = "kernel")]
pub mod kernel;

pub use cpu::{CpuId, CpuPlatform, CpuPurpose, CpuPurposeTable};
pub use error::{SchedError, SocketCode};
pub use ipi::IpiControl;
pub use task::{Callout, CountableTask, Functional, Runtime, Status, Task, TaskController};
pub use time::{Instant, TimeSource};
