use crate::{
    executor::TaskSystemError,
    task::Runnable,
    types::{BatchId, BatchState, HashMap, HashSet},
};
use core::any::Any;
use derive_more::Debug;
use rustc_hash::FxBuildHasher;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, trace};

/// Panic payload caught on a worker, re-raised on the coordinator.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Batch dependency state machine.
///
/// Only live batches are stored: a batch is removed the moment its last
/// sub-task returns. Every id below `next_id` that is not live is therefore
/// `Done`, which keeps dependency lookups on retired ids resolvable forever
/// without keeping a growing completed set around.
///
/// All fields are guarded by one lock owned by the pool.
#[derive(Debug)]
pub(crate) struct Scheduler {
    /// Next id to hand out.
    next_id: u64,
    /// Live batches (`Waiting`, `Ready` or `Running`).
    batches: HashMap<BatchId, Batch>,
    /// Live batches with at least one pending predecessor.
    waiting: HashSet<BatchId>,
    /// Batches with satisfied dependencies and undispatched sub-tasks, served
    /// front first.
    dispatchable: VecDeque<BatchId>,
    /// Number of times the graph has been observed drained by `sync`.
    generation: u64,
    /// First panic raised by a work item since it was last taken.
    #[debug(skip)]
    panic: Option<PanicPayload>,
    shutdown: bool,
}

#[derive(Debug)]
pub(crate) struct Batch {
    #[debug(skip)]
    runnable: Arc<dyn Runnable>,
    /// Total number of sub-tasks, fixed at submission.
    total: usize,
    /// Sub-tasks handed to a worker so far. Also the next index to dispatch.
    dispatched: usize,
    /// Sub-tasks that have returned from `run_task`.
    completed: usize,
    /// Predecessors that are still live.
    pending_deps: HashSet<BatchId>,
    /// Live batches waiting on this one.
    successors: Vec<BatchId>,
}

/// One dispatched sub-task.
#[derive(Debug)]
pub(crate) struct Unit {
    pub(crate) batch: BatchId,
    pub(crate) index: usize,
    pub(crate) total: usize,
    #[debug(skip)]
    pub(crate) runnable: Arc<dyn Runnable>,
}

/// Effect of retiring one sub-task, used to decide whom to wake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Completion {
    /// The batch still has sub-tasks outstanding.
    Pending,
    /// The batch reached `Done`; `unlocked` successors became dispatchable.
    Retired { unlocked: usize },
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            batches: HashMap::default(),
            waiting: HashSet::default(),
            dispatchable: VecDeque::new(),
            generation: 0,
            panic: None,
            shutdown: false,
        }
    }

    /// Register a new batch.
    ///
    /// Dependencies that already retired are dropped on the spot. Returns the
    /// new id and whether the batch is immediately dispatchable.
    ///
    /// # Errors
    /// If `total` is zero, or a dependency names an id that has not been
    /// handed out yet (the id about to be handed out counts as a self
    /// dependency). Nothing is modified on error.
    pub(crate) fn submit(
        &mut self,
        runnable: Arc<dyn Runnable>,
        total: usize,
        deps: &[BatchId],
    ) -> Result<(BatchId, bool), TaskSystemError> {
        if total == 0 {
            return Err(TaskSystemError::EmptyBatch);
        }
        let id = BatchId::from(self.next_id);
        let mut pending_deps = HashSet::with_capacity_and_hasher(deps.len(), FxBuildHasher);
        for &dep in deps {
            match dep.cmp(&id) {
                core::cmp::Ordering::Equal => return Err(TaskSystemError::SelfDependency(id)),
                core::cmp::Ordering::Greater => {
                    return Err(TaskSystemError::UnknownDependency(dep));
                }
                core::cmp::Ordering::Less => {
                    if self.batches.contains_key(&dep) {
                        pending_deps.insert(dep);
                    }
                }
            }
        }

        // Validation is over: from here on the submission cannot fail.
        self.next_id += 1;
        for dep in &pending_deps {
            let Some(predecessor) = self.batches.get_mut(dep) else {
                unreachable!("Scheduler::submit: live dependency {dep} vanished");
            };
            predecessor.successors.push(id);
        }
        let ready = pending_deps.is_empty();
        debug!(
            %id,
            total,
            deps = deps.len(),
            pending = pending_deps.len(),
            "batch submitted"
        );
        self.batches.insert(
            id,
            Batch {
                runnable,
                total,
                dispatched: 0,
                completed: 0,
                pending_deps,
                successors: Vec::new(),
            },
        );
        if ready {
            self.dispatchable.push_back(id);
        } else {
            self.waiting.insert(id);
        }
        Ok((id, ready))
    }

    /// Claim the next undispatched sub-task of the front dispatchable batch.
    ///
    /// A batch leaves the dispatchable queue together with its last index, so
    /// a fully dispatched batch is never looked at again.
    pub(crate) fn acquire(&mut self) -> Option<Unit> {
        let &id = self.dispatchable.front()?;
        let Some(batch) = self.batches.get_mut(&id) else {
            unreachable!("Scheduler::acquire: dispatchable {id} is not live");
        };
        debug_assert!(batch.pending_deps.is_empty());
        debug_assert!(batch.dispatched < batch.total);
        let index = batch.dispatched;
        batch.dispatched += 1;
        if batch.dispatched == batch.total {
            self.dispatchable.pop_front();
        }
        trace!(%id, index, total = batch.total, "sub-task dispatched");
        Some(Unit {
            batch: id,
            index,
            total: batch.total,
            runnable: Arc::clone(&batch.runnable),
        })
    }

    /// Record that one dispatched sub-task of `id` has returned.
    ///
    /// The increment that reaches the batch total performs the `Done`
    /// transition: the batch is dropped from the live table (releasing its
    /// work item) and every successor whose last pending predecessor it was
    /// moves from waiting to dispatchable.
    pub(crate) fn report_done(&mut self, id: BatchId) -> Completion {
        let Some(batch) = self.batches.get_mut(&id) else {
            unreachable!("Scheduler::report_done: {id} is not live");
        };
        batch.completed += 1;
        debug_assert!(batch.completed <= batch.dispatched);
        if batch.completed < batch.total {
            return Completion::Pending;
        }

        let Some(batch) = self.batches.remove(&id) else {
            unreachable!("Scheduler::report_done: {id} removed twice");
        };
        let mut unlocked = 0;
        for successor_id in batch.successors {
            let Some(successor) = self.batches.get_mut(&successor_id) else {
                unreachable!("Scheduler::report_done: successor {successor_id} is not live");
            };
            let removed = successor.pending_deps.remove(&id);
            debug_assert!(removed);
            if successor.pending_deps.is_empty() {
                self.waiting.remove(&successor_id);
                self.dispatchable.push_back(successor_id);
                unlocked += 1;
            }
        }
        debug!(%id, unlocked, live = self.batches.len(), "batch done");
        Completion::Retired { unlocked }
    }

    /// Current state of `id`, or `None` if that id was never handed out.
    pub(crate) fn state_of(&self, id: BatchId) -> Option<BatchState> {
        if id.get() >= self.next_id {
            return None;
        }
        let state = match self.batches.get(&id) {
            None => BatchState::Done,
            Some(batch) if !batch.pending_deps.is_empty() => BatchState::Waiting,
            Some(batch) if batch.dispatched == 0 => BatchState::Ready,
            Some(_) => BatchState::Running,
        };
        Some(state)
    }

    pub(crate) fn is_done(&self, id: BatchId) -> bool {
        id.get() < self.next_id && !self.batches.contains_key(&id)
    }

    pub(crate) fn has_dispatchable(&self) -> bool {
        !self.dispatchable.is_empty()
    }

    /// No batch is waiting, dispatchable or running.
    pub(crate) fn is_drained(&self) -> bool {
        self.batches.is_empty()
    }

    /// Close the current generation; must only be called while drained.
    pub(crate) fn finish_generation(&mut self) -> u64 {
        debug_assert!(self.is_drained());
        debug_assert!(self.waiting.is_empty() && self.dispatchable.is_empty());
        self.generation += 1;
        debug!(
            generation = self.generation,
            submitted = self.next_id,
            "generation drained"
        );
        self.generation
    }

    /// Keep the first panic; later ones are dropped.
    pub(crate) fn record_panic(&mut self, payload: PanicPayload) {
        self.panic.get_or_insert(payload);
    }

    pub(crate) fn take_panic(&mut self) -> Option<PanicPayload> {
        self.panic.take()
    }

    pub(crate) fn shut_down(&mut self) {
        self.shutdown = true;
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Runnable> {
        Arc::new(|_: usize, _: usize| {})
    }

    fn id(raw: u64) -> BatchId {
        BatchId::from(raw)
    }

    /// Dispatch and retire everything currently dispatchable, in order.
    fn drain_dispatchable(scheduler: &mut Scheduler) -> Vec<(BatchId, usize)> {
        let mut units = vec![];
        while let Some(unit) = scheduler.acquire() {
            units.push((unit.batch, unit.index));
            scheduler.report_done(unit.batch);
        }
        units
    }

    #[test]
    fn ids_are_sequential_from_zero() {
        let mut scheduler = Scheduler::new();
        for expected in 0..5 {
            let (got, ready) = scheduler.submit(noop(), 1, &[]).unwrap();
            assert_eq!(got, id(expected));
            assert!(ready);
        }
    }

    #[test]
    fn indices_are_dispatched_in_order_exactly_once() {
        let mut scheduler = Scheduler::new();
        let (a, _) = scheduler.submit(noop(), 3, &[]).unwrap();
        let units: Vec<_> = core::iter::from_fn(|| scheduler.acquire())
            .map(|unit| (unit.batch, unit.index, unit.total))
            .collect();
        assert_eq!(units, vec![(a, 0, 3), (a, 1, 3), (a, 2, 3)]);
        assert!(!scheduler.has_dispatchable());
        assert_eq!(scheduler.state_of(a), Some(BatchState::Running));
    }

    #[test]
    fn completion_is_detected_on_the_last_report_only() {
        let mut scheduler = Scheduler::new();
        let (a, _) = scheduler.submit(noop(), 2, &[]).unwrap();
        let first = scheduler.acquire().unwrap();
        let second = scheduler.acquire().unwrap();
        assert_eq!(scheduler.report_done(second.batch), Completion::Pending);
        assert!(!scheduler.is_done(a));
        assert_eq!(
            scheduler.report_done(first.batch),
            Completion::Retired { unlocked: 0 }
        );
        assert!(scheduler.is_done(a));
        assert!(scheduler.is_drained());
    }

    #[test]
    fn successor_waits_until_every_predecessor_retires() {
        let mut scheduler = Scheduler::new();
        let (a, _) = scheduler.submit(noop(), 1, &[]).unwrap();
        let (b, _) = scheduler.submit(noop(), 1, &[]).unwrap();
        let (c, ready) = scheduler.submit(noop(), 2, &[a, b, a]).unwrap();
        assert!(!ready);
        assert_eq!(scheduler.state_of(c), Some(BatchState::Waiting));

        let unit_a = scheduler.acquire().unwrap();
        assert_eq!(unit_a.batch, a);
        assert_eq!(
            scheduler.report_done(a),
            Completion::Retired { unlocked: 0 }
        );
        assert_eq!(scheduler.state_of(c), Some(BatchState::Waiting));

        let unit_b = scheduler.acquire().unwrap();
        assert_eq!(unit_b.batch, b);
        assert_eq!(
            scheduler.report_done(b),
            Completion::Retired { unlocked: 1 }
        );
        assert_eq!(scheduler.state_of(c), Some(BatchState::Ready));

        assert_eq!(drain_dispatchable(&mut scheduler), vec![(c, 0), (c, 1)]);
        assert!(scheduler.is_drained());
    }

    #[test]
    fn retired_dependency_is_dropped_at_submission() {
        let mut scheduler = Scheduler::new();
        let (a, _) = scheduler.submit(noop(), 1, &[]).unwrap();
        drain_dispatchable(&mut scheduler);
        assert_eq!(scheduler.state_of(a), Some(BatchState::Done));
        scheduler.finish_generation();

        let (b, ready) = scheduler.submit(noop(), 1, &[a]).unwrap();
        assert!(ready);
        assert_eq!(scheduler.state_of(b), Some(BatchState::Ready));
    }

    #[test]
    fn invalid_submissions_do_not_consume_ids() {
        let mut scheduler = Scheduler::new();
        assert!(matches!(
            scheduler.submit(noop(), 0, &[]),
            Err(TaskSystemError::EmptyBatch)
        ));
        assert!(matches!(
            scheduler.submit(noop(), 1, &[id(0)]),
            Err(TaskSystemError::SelfDependency(x)) if x == id(0)
        ));
        assert!(matches!(
            scheduler.submit(noop(), 1, &[id(7)]),
            Err(TaskSystemError::UnknownDependency(x)) if x == id(7)
        ));
        assert_eq!(scheduler.state_of(id(0)), None);
        let (first, _) = scheduler.submit(noop(), 1, &[]).unwrap();
        assert_eq!(first, id(0));
    }

    #[test]
    fn work_item_is_released_on_retirement() {
        let mut scheduler = Scheduler::new();
        let work: Arc<dyn Runnable> = Arc::new(|_: usize, _: usize| {});
        let (a, _) = scheduler.submit(Arc::clone(&work), 2, &[]).unwrap();
        let units: Vec<_> = core::iter::from_fn(|| scheduler.acquire()).collect();
        assert_eq!(Arc::strong_count(&work), 4);
        drop(units);
        scheduler.report_done(a);
        scheduler.report_done(a);
        assert_eq!(Arc::strong_count(&work), 1);
    }

    #[test]
    fn diamond_unlocks_join_once() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let mut scheduler = Scheduler::new();
        let (a, _) = scheduler.submit(noop(), 1, &[]).unwrap();
        let (b, _) = scheduler.submit(noop(), 1, &[a]).unwrap();
        let (c, _) = scheduler.submit(noop(), 1, &[a]).unwrap();
        let (d, _) = scheduler.submit(noop(), 1, &[b, c]).unwrap();

        let order: Vec<_> = drain_dispatchable(&mut scheduler)
            .into_iter()
            .map(|(batch, _)| batch)
            .collect();
        assert_eq!(order, vec![a, b, c, d]);
        assert!(scheduler.is_drained());
        assert_eq!(scheduler.finish_generation(), 1);
    }

    #[test]
    fn first_panic_wins() {
        let mut scheduler = Scheduler::new();
        scheduler.record_panic(Box::new("first"));
        scheduler.record_panic(Box::new("second"));
        let payload = scheduler.take_panic().unwrap();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"first"));
        assert!(scheduler.take_panic().is_none());
    }
}
