//! Compile-time knobs collected in one place.

/// Max simultaneous CPUs a `TaskController`/`CpuPurposeTable` is sized for.
/// Override by choosing a different const generic when instantiating them;
/// this is just the default a consumer gets from [`crate::Runtime::new`]
/// style constructors that don't want to thread the generic through.
pub const MAX_CPUS: usize = 4;

/// TCP maximum segment size, matching the historical Ethernet/IPv4 MTU
/// assumption (`1500 - 20 (ip) - 20 (tcp)`).
pub const TCP_MSS: u16 = 1460;

/// Idle sleep between dispatcher polls on platforms with no `hlt`
/// (userspace/test backend only — the `kernel` feature backend blocks on
/// a real interrupt instead of polling).
pub const IDLE_POLL_MICROS: u64 = 10;

/// How far out the dispatcher arms the local timer / looks for due
/// callouts on each `NotRunning -> Running` transition, in `TimeSource`
/// ticks.
pub const TASK_EXECUTION_INTERVAL: u64 = 10_000;
