//! Work-item construction.
//!
//! A pure transform from a task and a partition range to the message
//! dispatched to an execution unit. Reserved request fields are stripped
//! from the forwarded parameter map — units re-derive them from the
//! payload itself, they are never copied through.

use std::ops::Range;
use std::sync::Arc;

use serde_json::{Map, Value};

use fanout_core::{PartitionInput, Sequence, SharedBuffer, TaskId, WorkFn, WorkPayload};

/// Request fields never forwarded in the parameter map.
pub const RESERVED_PARAMS: [&str; 3] = ["input", "partitions", "shared_buffer"];

/// The task-level fields a payload is built from.
pub struct PayloadSource<'a> {
    pub task: TaskId,
    pub work: &'a WorkFn,
    pub input: &'a Arc<Sequence>,
    pub shared: Option<&'a Arc<SharedBuffer>>,
    pub params: &'a Map<String, Value>,
    /// Whether the transport moves binary data instead of copying it.
    pub zero_copy: bool,
}

/// Build the dispatch payload for one partition.
///
/// When a shared output buffer is in play the payload carries an offset
/// descriptor instead of copied data. Otherwise the partition data is a
/// zero-copy view when the transport supports it, or an owned copy.
pub fn build_payload(
    source: &PayloadSource<'_>,
    partition: usize,
    range: Range<usize>,
) -> WorkPayload {
    let data = match source.shared {
        Some(buffer) => PartitionInput::BufferRange {
            buffer: Arc::clone(buffer),
            offset: range.start,
            len: range.len(),
        },
        None if source.zero_copy => PartitionInput::View {
            source: Arc::clone(source.input),
            range,
        },
        None => PartitionInput::Owned(source.input.view(range)),
    };
    WorkPayload {
        task: source.task,
        partition,
        data,
        params: strip_reserved(source.params),
        work: Arc::clone(source.work),
    }
}

fn strip_reserved(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
