use thiserror::Error;

/// Errors surfaced to callers of the pool.
///
/// Request-shape errors fail synchronously at submission time; all
/// unit-originated errors reject the task's pending future. The first
/// error for a task is terminal for that task — no retry, no partial
/// result. Errors in one task never affect other tasks sharing the pool.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("invalid partition count: requested {requested}, pool capacity {capacity}")]
    InvalidPartitionCount { requested: usize, capacity: usize },

    #[error("unit spawn failure: {0}")]
    UnitSpawnFailure(String),

    #[error("unit communication error: {0}")]
    UnitCommunicationError(String),

    #[error("unit runtime error in partition {partition}: {message}")]
    UnitRuntimeError { partition: usize, message: String },

    #[error("buffer mismatch: {0}")]
    BufferMismatch(String),

    #[error("pending queue full: {0} entries")]
    QueueFull(usize),

    #[error("pool closed")]
    PoolClosed,
}

impl PoolError {
    /// Stable machine-readable kind tag for the error.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::InvalidPartitionCount { .. } => "invalid-partition-count",
            PoolError::UnitSpawnFailure(_) => "unit-spawn-failure",
            PoolError::UnitCommunicationError(_) => "unit-communication-error",
            PoolError::UnitRuntimeError { .. } => "unit-runtime-error",
            PoolError::BufferMismatch(_) => "buffer-mismatch",
            PoolError::QueueFull(_) => "queue-full",
            PoolError::PoolClosed => "pool-closed",
        }
    }

    /// The partition the error originated from, where one exists.
    pub fn origin_partition(&self) -> Option<usize> {
        match self {
            PoolError::UnitRuntimeError { partition, .. } => Some(*partition),
            _ => None,
        }
    }
}
