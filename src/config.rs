use crate::wait::{Park, Spin, WaitStrategy};

/// Configuration entry-point for instantiating the thread pool.
///
/// A concrete `Config` binds a specific `WaitStrategy` to the pool, deciding
/// how idle workers and a blocked coordinator wait for each other.
pub trait Config: Sized + 'static {
    /// Idle strategy used by workers and by `run`/`sync`.
    type Wait: WaitStrategy;
    /// Prefix of worker thread names; the worker index is appended.
    const WORKER_NAME: &'static str = "tgp-worker";
}

/// Workers park on a condition variable while there is nothing to dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sleeping;

impl Config for Sleeping {
    type Wait = Park;
}

/// Workers busy-poll the scheduler, trading CPU for wake-up latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spinning;

impl Config for Spinning {
    type Wait = Spin;
}
