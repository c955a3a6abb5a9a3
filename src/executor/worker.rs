use crate::{
    config::Config,
    executor::{
        Shared,
        scheduler::{Completion, Unit},
    },
    sync::lock,
    wait::{Signal, WaitStrategy},
};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use tracing::{debug, trace};

/// Body of every worker thread.
///
/// Repeatedly claims one sub-task, runs it with the lock released, and
/// reports it back. Sleeps (or spins, depending on `C::Wait`) while nothing is
/// dispatchable and leaves as soon as shutdown is requested. Panics raised by
/// work items are caught here so the thread survives and the batch still
/// drains; the payload is handed to the coordinator.
pub(super) fn worker_loop<C: Config>(shared: &Arc<Shared<C>>, worker: usize) {
    debug!(worker, "worker started");
    let mut guard = lock(&shared.scheduler);
    loop {
        guard = shared
            .wait
            .wait_until(Signal::Work, &shared.scheduler, guard, |scheduler| {
                scheduler.is_shut_down() || scheduler.has_dispatchable()
            });
        if guard.is_shut_down() {
            break;
        }
        let Some(unit) = guard.acquire() else {
            continue;
        };
        drop(guard);

        let Unit {
            batch,
            index,
            total,
            runnable,
        } = unit;
        let outcome = catch_unwind(AssertUnwindSafe(|| runnable.run_task(index, total)));
        // The scheduler may release the last reference on retirement; this
        // worker must not keep the work item alive past that point.
        drop(runnable);

        guard = lock(&shared.scheduler);
        if let Err(payload) = outcome {
            debug!(worker, %batch, index, "work item panicked");
            guard.record_panic(payload);
        }
        match guard.report_done(batch) {
            Completion::Pending => {}
            Completion::Retired { unlocked } => {
                trace!(worker, %batch, unlocked, "retired batch");
                if unlocked > 0 {
                    shared.wait.notify(Signal::Work);
                }
                shared.wait.notify(Signal::Progress);
            }
        }
    }
    drop(guard);
    debug!(worker, "worker stopped");
}
