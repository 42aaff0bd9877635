pub mod config;
pub mod data;
pub mod error;
pub mod task;

pub use config::PoolConfig;
pub use data::{DataKind, NumericBuffer, Sequence, SharedBuffer};
pub use error::PoolError;
pub use task::{
    PartitionInput, SortOrder, TaskId, TaskOutput, TaskRequest, WorkFn, WorkPayload,
};
