use crate::sync::{Condvar, Mutex, MutexGuard, lock, relax, thread};
use std::sync::PoisonError;

/// Condition a waiter is interested in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A batch became dispatchable, or the pool is shutting down.
    Work,
    /// A batch retired.
    Progress,
}

/// How threads wait for a predicate over the scheduler state.
///
/// Workers wait on [`Signal::Work`] when nothing is dispatchable; the
/// coordinator waits on [`Signal::Progress`] inside `run` and `sync`.
/// Whoever changes the state in a way a waiter may care about calls
/// [`WaitStrategy::notify`] after the change is made under the lock.
pub trait WaitStrategy: Default + Send + Sync + 'static {
    /// Diagnostic name of the pool using this strategy.
    const NAME: &'static str;

    /// Block until `ready` returns `true` for the guarded state, returning
    /// the guard with the lock held.
    fn wait_until<'a, T>(
        &self,
        signal: Signal,
        mutex: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
        ready: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T>;

    /// Wake waiters of `signal`.
    fn notify(&self, signal: Signal);
}

/// Blocking strategy: waiters park on one condition variable per signal.
#[derive(Debug)]
pub struct Park {
    work: Condvar,
    progress: Condvar,
}

impl Default for Park {
    fn default() -> Self {
        Self {
            work: Condvar::new(),
            progress: Condvar::new(),
        }
    }
}

impl Park {
    fn condvar(&self, signal: Signal) -> &Condvar {
        match signal {
            Signal::Work => &self.work,
            Signal::Progress => &self.progress,
        }
    }
}

impl WaitStrategy for Park {
    const NAME: &'static str = "Parallel + Thread Pool + Sleep";

    fn wait_until<'a, T>(
        &self,
        signal: Signal,
        _mutex: &'a Mutex<T>,
        mut guard: MutexGuard<'a, T>,
        mut ready: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        let condvar = self.condvar(signal);
        while !ready(&mut *guard) {
            guard = condvar.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
        guard
    }

    fn notify(&self, signal: Signal) {
        self.condvar(signal).notify_all();
    }
}

/// Busy-polling strategy: waiters release the lock, spin for a while, then
/// yield their time slice between polls. Nobody is ever put to sleep, so
/// `notify` has nothing to do.
#[derive(Debug, Default)]
pub struct Spin;

impl Spin {
    /// Number of polls backed by a spin hint before falling back to yielding.
    const SPINS_BEFORE_YIELD: u32 = 64;
}

impl WaitStrategy for Spin {
    const NAME: &'static str = "Parallel + Thread Pool + Spin";

    fn wait_until<'a, T>(
        &self,
        _signal: Signal,
        mutex: &'a Mutex<T>,
        mut guard: MutexGuard<'a, T>,
        mut ready: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        let mut spins = 0u32;
        while !ready(&mut *guard) {
            drop(guard);
            if spins < Self::SPINS_BEFORE_YIELD {
                spins += 1;
                relax();
            } else {
                thread::yield_now();
            }
            guard = lock(mutex);
        }
        guard
    }

    #[inline]
    fn notify(&self, _signal: Signal) {}
}
