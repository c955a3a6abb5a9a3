use crate::{executor::TaskSystemError, system::TaskSystem, task::Runnable, types::BatchId};
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Reference engine executing every sub-task on the calling thread.
///
/// `submit_async` runs the batch before returning: dependencies can only name
/// earlier ids, and those have all run already. It validates its arguments
/// exactly like [`ThreadPool`](crate::ThreadPool), which makes it usable as an
/// oracle in tests.
#[derive(Debug, Default)]
pub struct SerialTaskSystem {
    next_id: AtomicU64,
}

impl SerialTaskSystem {
    /// Create a serial engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskSystem for SerialTaskSystem {
    fn name(&self) -> &'static str {
        "Serial"
    }

    fn run(
        &self,
        runnable: Arc<dyn Runnable>,
        num_total_tasks: usize,
    ) -> Result<(), TaskSystemError> {
        if num_total_tasks == 0 {
            return Err(TaskSystemError::EmptyBatch);
        }
        for task_index in 0..num_total_tasks {
            runnable.run_task(task_index, num_total_tasks);
        }
        Ok(())
    }

    fn submit_async(
        &self,
        runnable: Arc<dyn Runnable>,
        num_total_tasks: usize,
        deps: &[BatchId],
    ) -> Result<BatchId, TaskSystemError> {
        if num_total_tasks == 0 {
            return Err(TaskSystemError::EmptyBatch);
        }
        // Validation and reservation happen in one atomic step, so concurrent
        // submitters never share an id.
        let reserved = self.next_id.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| {
            let candidate = BatchId::from(next);
            deps.iter().all(|&dep| dep < candidate).then_some(next + 1)
        });
        let id = match reserved {
            Ok(next) => BatchId::from(next),
            Err(next) => {
                let id = BatchId::from(next);
                let dep = deps.iter().copied().find(|&dep| dep >= id).unwrap_or(id);
                return Err(if dep == id {
                    TaskSystemError::SelfDependency(id)
                } else {
                    TaskSystemError::UnknownDependency(dep)
                });
            }
        };
        debug!(%id, total = num_total_tasks, "running batch inline");
        self.run(runnable, num_total_tasks)?;
        Ok(id)
    }

    fn sync(&self) {}
}
