mod error;
mod scheduler;
mod worker;

/// Error returned when the pool cannot be built or a batch is rejected.
pub use crate::executor::error::TaskSystemError;
use crate::{
    config::Config,
    executor::{scheduler::Scheduler, worker::worker_loop},
    sync::{JoinHandle, Mutex, MutexGuard, lock, thread},
    system::TaskSystem,
    task::Runnable,
    types::{BatchId, BatchState},
    wait::{Signal, WaitStrategy},
};
use core::{fmt, num::NonZeroUsize};
use std::{env::VarError, panic::resume_unwind, sync::Arc};
use tracing::{debug, error};

/// Environment variable read by [`ThreadPool::from_env`].
pub const NUM_THREADS_ENV: &str = "TGP_NUM_THREADS";

/// Fixed pool of worker threads fed by a batch dependency scheduler.
///
/// Key responsibilities:
/// - Starts all workers at construction and joins them on drop.
/// - Accepts batches through `run` (blocking fork-join) and `submit_async`
///   (non-blocking, with dependencies on earlier batches).
/// - Hands each index of a dispatchable batch to exactly one worker and
///   retires the batch on its last completion, unlocking successors.
/// - Blocks the coordinator in `run`/`sync` using the wait strategy bound by
///   `C`.
///
/// A single coordinating thread is expected to submit and then `sync`. The
/// pool must be drained before it is dropped; batches still outstanding at
/// drop time are abandoned.
#[must_use]
pub struct ThreadPool<C: Config> {
    shared: Arc<Shared<C>>,
    workers: Vec<JoinHandle<()>>,
}

/// State shared between the coordinator and the workers.
pub(crate) struct Shared<C: Config> {
    pub(crate) scheduler: Mutex<Scheduler>,
    pub(crate) wait: C::Wait,
}

impl<C: Config> ThreadPool<C> {
    /// Start a pool with `num_threads` workers.
    ///
    /// # Errors
    /// If `num_threads` is zero, or a worker thread cannot be spawned. Workers
    /// that were already started are shut down and joined before returning.
    pub fn new(num_threads: usize) -> Result<Self, TaskSystemError> {
        let num_threads = NonZeroUsize::new(num_threads).ok_or(TaskSystemError::ZeroThreads)?;
        let mut pool = Self {
            shared: Arc::new(Shared {
                scheduler: Mutex::new(Scheduler::new()),
                wait: C::Wait::default(),
            }),
            workers: Vec::with_capacity(num_threads.get()),
        };
        for worker in 0..num_threads.get() {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{worker}", C::WORKER_NAME))
                .spawn(move || worker_loop(&shared, worker))?;
            pool.workers.push(handle);
        }
        debug!(
            threads = pool.workers.len(),
            strategy = C::Wait::NAME,
            "thread pool started"
        );
        Ok(pool)
    }

    /// Start a pool sized by the `TGP_NUM_THREADS` environment variable,
    /// falling back to the available parallelism of the machine.
    ///
    /// # Errors
    /// If the variable is set but is not a positive integer, or if the pool
    /// cannot be started.
    pub fn from_env() -> Result<Self, TaskSystemError> {
        let num_threads = match std::env::var(NUM_THREADS_ENV) {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or(TaskSystemError::InvalidThreadCount(raw))?,
            Err(VarError::NotPresent) => thread_count_fallback(),
            Err(VarError::NotUnicode(raw)) => {
                return Err(TaskSystemError::InvalidThreadCount(
                    raw.to_string_lossy().into_owned(),
                ));
            }
        };
        Self::new(num_threads)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Current state of a submitted batch.
    ///
    /// Retired batches report [`BatchState::Done`] forever, across `sync`
    /// calls.
    ///
    /// # Errors
    /// If `id` was never handed out by this pool.
    pub fn batch_state(&self, id: BatchId) -> Result<BatchState, TaskSystemError> {
        lock(&self.shared.scheduler)
            .state_of(id)
            .ok_or(TaskSystemError::UnknownBatch(id))
    }

    /// Block until `ready` holds, then re-raise any work-item panic.
    ///
    /// The panic slot is pool-wide, so the re-raised payload may come from
    /// any earlier batch, not only the one `ready` watches.
    fn wait_for(&self, ready: impl FnMut(&mut Scheduler) -> bool) -> MutexGuard<'_, Scheduler> {
        let Shared { scheduler, wait } = &*self.shared;
        let mut guard = wait.wait_until(Signal::Progress, scheduler, lock(scheduler), ready);
        if let Some(payload) = guard.take_panic() {
            drop(guard);
            resume_unwind(payload);
        }
        guard
    }
}

#[cfg(not(feature = "loom"))]
fn thread_count_fallback() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

#[cfg(feature = "loom")]
fn thread_count_fallback() -> usize {
    2
}

impl<C: Config> TaskSystem for ThreadPool<C> {
    fn name(&self) -> &'static str {
        C::Wait::NAME
    }

    fn run(
        &self,
        runnable: Arc<dyn Runnable>,
        num_total_tasks: usize,
    ) -> Result<(), TaskSystemError> {
        let id = self.submit_async(runnable, num_total_tasks, &[])?;
        drop(self.wait_for(|scheduler| scheduler.is_done(id)));
        Ok(())
    }

    fn submit_async(
        &self,
        runnable: Arc<dyn Runnable>,
        num_total_tasks: usize,
        deps: &[BatchId],
    ) -> Result<BatchId, TaskSystemError> {
        let (id, ready) = lock(&self.shared.scheduler).submit(runnable, num_total_tasks, deps)?;
        if ready {
            self.shared.wait.notify(Signal::Work);
        }
        Ok(id)
    }

    fn sync(&self) {
        let mut guard = self.wait_for(|scheduler| scheduler.is_drained());
        guard.finish_generation();
    }
}

impl<C: Config> Drop for ThreadPool<C> {
    fn drop(&mut self) {
        {
            let mut guard = lock(&self.shared.scheduler);
            if !guard.is_drained() {
                error!("thread pool dropped with batches outstanding");
            }
            guard.shut_down();
        }
        self.shared.wait.notify(Signal::Work);
        for (worker, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                error!(worker, "worker thread panicked");
            }
        }
        debug!("thread pool stopped");
    }
}

impl<C: Config> fmt::Debug for ThreadPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("strategy", &C::Wait::NAME)
            .field("num_threads", &self.workers.len())
            .finish_non_exhaustive()
    }
}
