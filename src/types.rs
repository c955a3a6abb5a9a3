use derive_more::{Display, From, Into};
use indexmap::{IndexMap as _IndexMap, IndexSet as _IndexSet};
use rustc_hash::FxBuildHasher;
use std::collections::{HashMap as _HashMap, HashSet as _HashSet};

/// Unique identifier of a submitted batch.
///
/// Ids are assigned from zero upwards in submission order and are never
/// reused, so any id lower than the next one to be assigned is known forever.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[display("batch#{_0}")]
#[repr(transparent)]
pub struct BatchId(u64);

impl BatchId {
    /// Raw numeric value of the id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Lifecycle of a batch inside the scheduler.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BatchState {
    /// At least one predecessor has not retired yet.
    Waiting,
    /// Dependencies are satisfied and no sub-task has been dispatched.
    Ready,
    /// Some sub-tasks have been handed to workers, not all have returned.
    Running,
    /// Every sub-task has returned.
    Done,
}

pub(crate) type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;
pub(crate) type HashSet<T> = _HashSet<T, FxBuildHasher>;
/// `IndexMap` type with fast hasher.
pub type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;
/// `IndexSet` type with fast hasher.
pub type IndexSet<T> = _IndexSet<T, FxBuildHasher>;
