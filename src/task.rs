/// A bulk work item: the body shared by every sub-task of a batch.
///
/// The engine invokes `run_task(i, n)` exactly once for every `i` in `0..n`,
/// possibly from several workers at the same time and in no particular order.
/// Implementations must therefore be safe under concurrent invocation for
/// distinct indices, and must not call back into the engine that runs them.
pub trait Runnable: Send + Sync {
    /// Execute sub-task `task_index` of a batch of `num_total_tasks`.
    fn run_task(&self, task_index: usize, num_total_tasks: usize);
}

impl<F> Runnable for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    #[inline]
    fn run_task(&self, task_index: usize, num_total_tasks: usize) {
        self(task_index, num_total_tasks);
    }
}
