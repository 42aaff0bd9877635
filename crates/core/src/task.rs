//! Task requests, work payloads, and task outputs.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::data::{DataKind, NumericBuffer, Sequence, SharedBuffer};
use crate::error::PoolError;

/// Unique identifier for one caller request.
pub type TaskId = Uuid;

/// Requested ordering of the combined output.
///
/// Wire names match the request format (`asc`, `desc-lex`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
    #[serde(rename = "asc-lex")]
    AscendingLexical,
    #[serde(rename = "desc-lex")]
    DescendingLexical,
}

/// The work a partition executes: a pure function from payload to
/// per-partition result. Prepared once per task and shared across all of
/// its partitions.
pub type WorkFn = Arc<dyn Fn(&WorkPayload) -> Result<Sequence, String> + Send + Sync>;

/// One partition's share of a task input.
#[derive(Debug, Clone)]
pub enum PartitionInput {
    /// A copied sub-sequence.
    Owned(Sequence),
    /// A zero-copy view into the task input: the `Arc` moves, the data
    /// does not.
    View {
        source: Arc<Sequence>,
        range: Range<usize>,
    },
    /// An offset descriptor into a shared output buffer, sent instead of
    /// copied data.
    BufferRange {
        buffer: Arc<SharedBuffer>,
        offset: usize,
        len: usize,
    },
}

impl PartitionInput {
    pub fn len(&self) -> usize {
        match self {
            PartitionInput::Owned(seq) => seq.len(),
            PartitionInput::View { range, .. } => range.len(),
            PartitionInput::BufferRange { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The message dispatched to an execution unit for one partition.
#[derive(Clone)]
pub struct WorkPayload {
    /// Owning task.
    pub task: TaskId,
    /// Stable partition index, 0..N-1. Used to place the result correctly
    /// regardless of completion order.
    pub partition: usize,
    /// The partition's data or shared-buffer descriptor.
    pub data: PartitionInput,
    /// Task parameters, minus the reserved keys.
    pub params: Map<String, Value>,
    /// The work to run.
    pub work: WorkFn,
}

impl WorkPayload {
    /// Materialize this partition's input sequence.
    pub fn input(&self) -> Result<Sequence, PoolError> {
        match &self.data {
            PartitionInput::Owned(seq) => Ok(seq.clone()),
            PartitionInput::View { source, range } => Ok(source.view(range.clone())),
            PartitionInput::BufferRange {
                buffer,
                offset,
                len,
            } => Ok(Sequence::Numeric(buffer.view(*offset..*offset + *len)?)),
        }
    }

    /// Write a result chunk back into the shared buffer at this
    /// partition's offset. Only valid for shared-buffer partitions.
    pub fn write_back(&self, chunk: &NumericBuffer) -> Result<(), PoolError> {
        match &self.data {
            PartitionInput::BufferRange {
                buffer,
                offset,
                len,
            } => {
                if chunk.len() != *len {
                    return Err(PoolError::BufferMismatch(format!(
                        "chunk length {} does not match partition length {}",
                        chunk.len(),
                        len
                    )));
                }
                buffer.write_range(*offset, chunk)
            }
            _ => Err(PoolError::BufferMismatch(
                "partition has no shared output buffer".to_string(),
            )),
        }
    }

    /// Whether the payload's data moves to the unit rather than being
    /// copied.
    pub fn transferable(&self) -> bool {
        matches!(
            self.data,
            PartitionInput::View { .. } | PartitionInput::BufferRange { .. }
        )
    }
}

impl fmt::Debug for WorkPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkPayload")
            .field("task", &self.task)
            .field("partition", &self.partition)
            .field("data", &self.data)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A caller's task submission.
#[derive(Clone)]
pub struct TaskRequest {
    /// The work function every partition runs.
    pub work: WorkFn,
    /// Input sequence, read-only to the scheduler.
    pub input: Sequence,
    /// Partition count N. Must be between 1 and the pool capacity.
    pub partitions: usize,
    /// Merge per-partition results into one sequence.
    pub aggregate: bool,
    /// Optional sort applied after combination.
    pub sort: Option<SortOrder>,
    /// Return each partition's raw result verbatim, without merging.
    pub mixed_output: bool,
    /// Element type tag for buffer-backed aggregation.
    pub data_kind: Option<DataKind>,
    /// Optional preallocated output buffer written in place by partitions.
    pub shared_buffer: Option<Arc<SharedBuffer>>,
    /// Caller parameters forwarded to every partition.
    pub params: Map<String, Value>,
}

impl TaskRequest {
    /// Create a single-partition request with default flags.
    pub fn new(work: WorkFn, input: Sequence) -> Self {
        Self {
            work,
            input,
            partitions: 1,
            aggregate: false,
            sort: None,
            mixed_output: false,
            data_kind: None,
            shared_buffer: None,
            params: Map::new(),
        }
    }

    pub fn partitions(mut self, n: usize) -> Self {
        self.partitions = n;
        self
    }

    pub fn aggregate(mut self, on: bool) -> Self {
        self.aggregate = on;
        self
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    pub fn mixed_output(mut self, on: bool) -> Self {
        self.mixed_output = on;
        self
    }

    pub fn data_kind(mut self, kind: DataKind) -> Self {
        self.data_kind = Some(kind);
        self
    }

    pub fn shared_buffer(mut self, buffer: Arc<SharedBuffer>) -> Self {
        self.shared_buffer = Some(buffer);
        self
    }

    /// Add a caller parameter forwarded to every partition.
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRequest")
            .field("partitions", &self.partitions)
            .field("aggregate", &self.aggregate)
            .field("sort", &self.sort)
            .field("mixed_output", &self.mixed_output)
            .field("data_kind", &self.data_kind)
            .field("input_len", &self.input.len())
            .finish_non_exhaustive()
    }
}

/// The combined result a task resolves with.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// One combined sequence.
    Single(Sequence),
    /// One entry per partition, in partition order.
    PerPartition(Vec<Sequence>),
}
