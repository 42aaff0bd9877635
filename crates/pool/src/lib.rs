//! Data-parallel task scheduler.
//!
//! Accepts a unit of work (a work function plus an input sequence),
//! partitions the input across a bounded pool of execution units,
//! dispatches the partitions, collects per-partition results while
//! preserving original ordering, and optionally aggregates/sorts the
//! combined result before resolving the caller.
//!
//! ```ignore
//! let provider = Arc::new(TokioProvider::new(4));
//! let pool = Pool::new(provider, PoolConfig::default());
//!
//! let work = prepare_work(|payload| {
//!     let input = payload.input().map_err(|e| e.to_string())?;
//!     // ... transform the partition ...
//!     Ok(input)
//! });
//! let output = pool
//!     .run(TaskRequest::new(work, input).partitions(4).aggregate(true))
//!     .await?;
//! ```

pub mod combine;
pub mod diagnostics;
pub mod partition;
pub mod payload;
pub mod scheduler;
pub mod unit;

pub use combine::{apply_sort, combine, CombineSpec};
pub use diagnostics::{DiagnosticsSink, LifecycleEvent, LifecyclePhase, TracingSink};
pub use fanout_core::{
    DataKind, NumericBuffer, PartitionInput, PoolConfig, PoolError, Sequence, SharedBuffer,
    SortOrder, TaskId, TaskOutput, TaskRequest, WorkFn, WorkPayload,
};
pub use partition::{partition, split_ranges};
pub use payload::{build_payload, PayloadSource, RESERVED_PARAMS};
pub use scheduler::Pool;
pub use unit::{
    prepare_work, CapabilityProvider, ExecutionUnit, ReportSender, TokioProvider, UnitId,
    UnitKind, UnitReport,
};
