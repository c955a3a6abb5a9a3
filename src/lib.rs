//! Bulk task execution on a fixed thread pool, with a dependency graph
//! between batches.
//!
//! This crate runs large batches of independent, index-addressed sub-tasks on
//! a pool of worker threads created once at construction. It:
//! - Dispatches every index of a batch to exactly one worker, in increasing
//!   order, and detects batch completion exactly once.
//! - Lets batches depend on previously submitted batches, so a batch starts
//!   only after all of its predecessors have retired their final sub-task.
//! - Offers a blocking fork-join facade (`run`) and an asynchronous graph API
//!   (`submit_async` + `sync`).
//! - Makes the idle behaviour swappable: workers and the coordinator either
//!   park on condition variables or busy-poll.
//!
//! Key modules:
//! - `task`: the `Runnable` work-item contract.
//! - `config`: binds a wait strategy to the pool via the `Config` trait.
//! - `wait`: the `WaitStrategy` trait and its `Park`/`Spin` implementations.
//! - `executor`: the thread pool and the batch state machine behind it.
//! - `system`: the `TaskSystem` facade shared by all engines.
//! - `serial`: a single-threaded reference engine.
//! - `graph`: keyed batch graphs with cycle detection, submitted in
//!   topological order.
//!
//! Quick start:
//! 1. Pick a config (`Sleeping` or `Spinning`) and build a
//!    `ThreadPool::<C>::new(num_threads)`.
//! 2. For fork-join work call `run(work, n)`.
//! 3. For graphs call `submit_async(work, n, &deps)` for each batch, then
//!    `sync()` to wait until everything submitted has retired.
//!
//! The pool must be synced before it is dropped: dropping it joins every
//! worker, but batches still outstanding at that point are abandoned.

/// Public interface to configure the thread pool.
///
/// Exposes the `Config` trait which binds the wait strategy for a concrete
/// instantiation of the pool, plus the two stock configurations.
pub mod config;
/// The thread pool and its batch scheduler.
///
/// Contains the dependency state machine (submission, dispatch, retirement,
/// drain) and the worker loop.
pub mod executor;
/// Keyed batch graphs with cycle detection.
pub mod graph;
/// Single-threaded reference engine.
pub mod serial;
mod sync;
/// The `TaskSystem` facade implemented by every engine.
pub mod system;
/// The work-item contract invoked by the engines.
pub mod task;
/// Core types used across the crate (batch ids, states, hash aliases).
pub mod types;
/// Idle strategies for workers and the coordinator.
pub mod wait;

pub use crate::{
    config::{Config, Sleeping, Spinning},
    executor::{TaskSystemError, ThreadPool},
    graph::{GraphError, TaskGraph},
    serial::SerialTaskSystem,
    system::TaskSystem,
    task::Runnable,
    types::{BatchId, BatchState},
};
