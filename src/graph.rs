use crate::{
    executor::TaskSystemError,
    system::TaskSystem,
    task::Runnable,
    types::{BatchId, IndexMap, IndexSet},
};
use core::{fmt::Debug, hash::Hash};
use derive_more::Debug as DebugDerive;
use rustc_hash::FxBuildHasher;
use std::{collections::VecDeque, sync::Arc};
use thiserror::Error;
use tracing::debug;

/// Error kind for invalid keyed batch graphs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// The same key was declared twice.
    #[error("batch {0} is declared twice")]
    DuplicateKey(String),
    /// A batch depends on a key that was never declared.
    #[error("batch {batch} depends on undeclared batch {dependency}")]
    UnknownKey {
        /// Declaring batch.
        batch: String,
        /// Missing dependency.
        dependency: String,
    },
    /// A batch lists itself as a dependency.
    #[error("batch {0} depends on itself")]
    SelfDependency(String),
    /// A batch was declared with zero sub-tasks.
    #[error("batch {0} has no sub-tasks")]
    EmptyBatch(String),
    /// No topological order exists; lists every batch that could not be
    /// ordered.
    #[error("graph contains cycle(s) through {0:?}")]
    Cycle(Vec<String>),
    /// The engine rejected a submission.
    #[error(transparent)]
    System(#[from] TaskSystemError),
}

/// A dependency graph of batches declared by caller-chosen keys.
///
/// Unlike [`TaskSystem::submit_async`], which only accepts dependencies on
/// ids that already exist, batches here may be declared in any order and may
/// reference batches declared later. That also makes cycles expressible, so
/// the graph is checked for them before anything is submitted.
#[derive(DebugDerive)]
pub struct TaskGraph<K> {
    nodes: IndexMap<K, Node<K>>,
}

#[derive(DebugDerive)]
struct Node<K> {
    #[debug(skip)]
    runnable: Arc<dyn Runnable>,
    num_total_tasks: usize,
    deps: IndexSet<K>,
}

impl<K> Default for TaskGraph<K> {
    fn default() -> Self {
        Self {
            nodes: IndexMap::default(),
        }
    }
}

impl<K: Hash + Eq + Debug> TaskGraph<K> {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of declared batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if no batch was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declare a batch of `num_total_tasks` sub-tasks running `runnable`,
    /// to start after every batch in `deps`.
    ///
    /// # Errors
    /// If `key` is already declared, appears in its own `deps`, or
    /// `num_total_tasks` is zero. A rejected batch is not recorded.
    pub fn add(
        &mut self,
        key: K,
        runnable: Arc<dyn Runnable>,
        num_total_tasks: usize,
        deps: impl IntoIterator<Item = K>,
    ) -> Result<&mut Self, GraphError> {
        if self.nodes.contains_key(&key) {
            return Err(GraphError::DuplicateKey(format!("{key:?}")));
        }
        if num_total_tasks == 0 {
            return Err(GraphError::EmptyBatch(format!("{key:?}")));
        }
        let deps: IndexSet<K> = deps.into_iter().collect();
        if deps.contains(&key) {
            return Err(GraphError::SelfDependency(format!("{key:?}")));
        }
        self.nodes.insert(
            key,
            Node {
                runnable,
                num_total_tasks,
                deps,
            },
        );
        Ok(self)
    }

    /// Order batches so that every batch comes after all of its
    /// dependencies, keeping declaration order among independent batches.
    ///
    /// # Errors
    /// If a dependency is undeclared, or the graph contains a cycle.
    pub fn topological_order(&self) -> Result<Vec<&K>, GraphError> {
        let len = self.nodes.len();

        // Phase 1: resolve dependency keys to declaration indexes and count, for
        // every batch, the dependencies it still waits for.
        let mut pending = Vec::with_capacity(len);
        let mut children = vec![Vec::new(); len];
        for (idx, (key, node)) in self.nodes.iter().enumerate() {
            for dep in &node.deps {
                let dep_idx = self
                    .nodes
                    .get_index_of(dep)
                    .ok_or_else(|| GraphError::UnknownKey {
                        batch: format!("{key:?}"),
                        dependency: format!("{dep:?}"),
                    })?;
                children[dep_idx].push(idx);
            }
            pending.push(node.deps.len());
        }

        // Phase 2: seed with independent batches.
        let mut queue: VecDeque<usize> = (0..len).filter(|&idx| pending[idx] == 0).collect();

        // Phase 3: Kahn's algorithm. A batch is emitted once its last
        // dependency has been emitted.
        let mut order = Vec::with_capacity(len);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for &child in &children[idx] {
                pending[child] -= 1;
                if pending[child] == 0 {
                    queue.push_back(child);
                }
            }
        }

        // Anything left over sits on, or behind, a cycle.
        if order.len() != len {
            let stuck = self
                .nodes
                .keys()
                .zip(&pending)
                .filter(|&(_, &left)| left > 0)
                .map(|(key, _)| format!("{key:?}"))
                .collect();
            return Err(GraphError::Cycle(stuck));
        }
        Ok(order
            .into_iter()
            .filter_map(|idx| self.nodes.get_index(idx).map(|(key, _)| key))
            .collect())
    }
}

impl<K: Hash + Eq + Debug + Clone> TaskGraph<K> {
    /// Validate the graph, then submit every batch to `system` in
    /// topological order without waiting. Call [`TaskSystem::sync`] to wait
    /// for completion.
    ///
    /// # Errors
    /// Every graph error, empty batches included, is reported before
    /// anything is submitted. If the engine still rejects a batch, batches
    /// submitted before it stay submitted.
    pub fn submit(
        &self,
        system: &(impl TaskSystem + ?Sized),
    ) -> Result<IndexMap<K, BatchId>, GraphError> {
        let order = self.topological_order()?;
        let mut ids = IndexMap::with_capacity_and_hasher(order.len(), FxBuildHasher);
        for key in order {
            let node = &self.nodes[key];
            let deps: Vec<BatchId> = node.deps.iter().map(|dep| ids[dep]).collect();
            let id = system.submit_async(Arc::clone(&node.runnable), node.num_total_tasks, &deps)?;
            debug!(key = ?key, %id, "graph batch submitted");
            ids.insert(key.clone(), id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn Runnable> {
        Arc::new(|_: usize, _: usize| {})
    }

    #[test]
    fn orders_dependencies_first_regardless_of_declaration_order() {
        //   a     b
        //    \   /
        //      c
        //      |
        //      d
        let mut graph = TaskGraph::new();
        graph
            .add("d", noop(), 1, ["c"])
            .unwrap()
            .add("c", noop(), 1, ["a", "b"])
            .unwrap()
            .add("a", noop(), 1, [])
            .unwrap()
            .add("b", noop(), 1, [])
            .unwrap();
        let order: Vec<_> = graph.topological_order().unwrap().into_iter().copied().collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn detects_cycles() {
        let mut graph = TaskGraph::new();
        graph
            .add(1, noop(), 1, [3])
            .unwrap()
            .add(2, noop(), 1, [1])
            .unwrap()
            .add(3, noop(), 1, [2])
            .unwrap()
            .add(4, noop(), 1, [])
            .unwrap();
        match graph.topological_order() {
            Err(GraphError::Cycle(stuck)) => assert_eq!(stuck, vec!["1", "2", "3"]),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn rejects_self_and_unknown_dependencies() {
        let mut graph = TaskGraph::new();
        assert!(matches!(
            graph.add("a", noop(), 1, ["a"]),
            Err(GraphError::SelfDependency(_))
        ));
        graph.add("a", noop(), 1, ["missing"]).unwrap();
        assert!(matches!(
            graph.add("a", noop(), 1, []),
            Err(GraphError::DuplicateKey(_))
        ));
        assert!(matches!(
            graph.topological_order(),
            Err(GraphError::UnknownKey { .. })
        ));
    }

    #[test]
    fn empty_graph_has_empty_order() {
        let graph = TaskGraph::<u32>::new();
        assert!(graph.is_empty());
        assert!(graph.topological_order().unwrap().is_empty());
    }

    #[test]
    fn rejects_empty_batches_without_recording_them() {
        let mut graph = TaskGraph::new();
        graph.add("a", noop(), 1, []).unwrap();
        assert!(matches!(
            graph.add("b", noop(), 0, ["a"]),
            Err(GraphError::EmptyBatch(key)) if key == "\"b\""
        ));
        assert_eq!(graph.len(), 1);
        // The key stays free for a valid declaration.
        graph.add("b", noop(), 2, ["a"]).unwrap();
        let order: Vec<_> = graph.topological_order().unwrap().into_iter().copied().collect();
        assert_eq!(order, vec!["a", "b"]);
    }
}
