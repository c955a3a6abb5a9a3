use crate::types::BatchId;
use thiserror::Error;

/// Error kind for rejected pool construction or batch submission.
///
/// Submissions are validated before an id is allocated, so a rejected
/// submission leaves the scheduler untouched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TaskSystemError {
    /// The pool was asked for zero worker threads.
    #[error("thread pool needs at least one worker thread")]
    ZeroThreads,
    /// A thread count taken from the environment could not be used.
    #[error("invalid worker thread count {0:?}")]
    InvalidThreadCount(String),
    /// A batch was submitted with zero sub-tasks.
    #[error("batch must contain at least one sub-task")]
    EmptyBatch,
    /// A dependency names an id that was never handed out.
    #[error("dependency {0} was never submitted")]
    UnknownDependency(BatchId),
    /// A queried id was never handed out.
    #[error("{0} was never submitted")]
    UnknownBatch(BatchId),
    /// A dependency names the id the batch itself would receive.
    #[error("{0} depends on itself")]
    SelfDependency(BatchId),
    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
