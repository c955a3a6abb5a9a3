use crate::{executor::TaskSystemError, task::Runnable, types::BatchId};
use std::sync::Arc;

/// Entry points shared by every engine.
///
/// `run` is the blocking fork-join facade; `submit_async` + `sync` build and
/// drain a dependency graph of batches. A work item that panics inside
/// `run_task` makes the next `run` or `sync` on the coordinating thread panic
/// with the same payload.
pub trait TaskSystem {
    /// Static name of the execution strategy, for diagnostics.
    fn name(&self) -> &'static str;

    /// Execute `runnable.run_task(i, num_total_tasks)` for every `i` in
    /// `0..num_total_tasks` and return once all of them have returned.
    ///
    /// # Panics
    /// Re-raises the first work-item panic recorded since the last `run` or
    /// `sync`. That panic may come from a batch submitted earlier through
    /// `submit_async`, not necessarily from this one.
    ///
    /// # Errors
    /// If `num_total_tasks` is zero.
    fn run(
        &self,
        runnable: Arc<dyn Runnable>,
        num_total_tasks: usize,
    ) -> Result<(), TaskSystemError>;

    /// Submit a batch that starts once every batch in `deps` is done, and
    /// return its id without waiting.
    ///
    /// Ids are handed out in strictly increasing order. Dependencies that are
    /// already done are satisfied immediately.
    ///
    /// # Errors
    /// If `num_total_tasks` is zero, or `deps` names an id this engine never
    /// handed out (including the id this batch would receive).
    fn submit_async(
        &self,
        runnable: Arc<dyn Runnable>,
        num_total_tasks: usize,
        deps: &[BatchId],
    ) -> Result<BatchId, TaskSystemError>;

    /// Block until every batch submitted so far, including batches unlocked
    /// while waiting, is done.
    fn sync(&self);
}
