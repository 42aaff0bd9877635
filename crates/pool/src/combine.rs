//! Output combination.
//!
//! Merges N per-partition results into the task's final output, either by
//! ordered concatenation or by offset-copying into one preallocated
//! contiguous buffer, then applies the optional sort.

use fanout_core::{DataKind, NumericBuffer, PoolError, Sequence, SortOrder, TaskOutput};

/// How a task's ordered result slots are combined.
#[derive(Debug, Clone, Default)]
pub struct CombineSpec {
    pub aggregate: bool,
    pub sort: Option<SortOrder>,
    pub mixed_output: bool,
    pub data_kind: Option<DataKind>,
}

/// Combine ordered per-partition results into the final task output.
///
/// `slots` must be in partition order; completion order has already been
/// erased by index-addressed result placement.
pub fn combine(slots: Vec<Sequence>, spec: &CombineSpec) -> Result<TaskOutput, PoolError> {
    let mut output = if slots.len() == 1 {
        match slots.into_iter().next() {
            Some(only) => TaskOutput::Single(only),
            None => TaskOutput::Single(Sequence::Values(Vec::new())),
        }
    } else if !spec.aggregate || spec.mixed_output {
        TaskOutput::PerPartition(slots)
    } else if let Some(kind) = spec.data_kind {
        TaskOutput::Single(Sequence::Numeric(aggregate_numeric(kind, &slots)?))
    } else {
        TaskOutput::Single(concat_values(slots))
    };

    if let Some(order) = spec.sort {
        apply_sort(&mut output, order);
    }
    Ok(output)
}

/// Concatenate partition results in partition order into one value
/// sequence. Buffer-backed partial results flatten to JSON numbers when
/// no data kind was declared.
fn concat_values(slots: Vec<Sequence>) -> Sequence {
    let mut merged = Vec::new();
    for slot in slots {
        match slot {
            Sequence::Values(values) => merged.extend(values),
            Sequence::Numeric(buffer) => merged.extend(buffer.to_values()),
        }
    }
    Sequence::Values(merged)
}

/// Offset-copy each partition's elements into one contiguous buffer at
/// the cumulative offset of all partitions before it. One pass, O(total
/// length).
fn aggregate_numeric(kind: DataKind, slots: &[Sequence]) -> Result<NumericBuffer, PoolError> {
    let mut total = 0;
    for slot in slots {
        match slot {
            Sequence::Numeric(buffer) => total += buffer.len(),
            Sequence::Values(_) => {
                return Err(PoolError::BufferMismatch(
                    "partition result is not a numeric buffer".to_string(),
                ));
            }
        }
    }

    let mut merged = NumericBuffer::zeroed(kind, total);
    let mut offset = 0;
    for slot in slots {
        if let Sequence::Numeric(buffer) = slot {
            merged.copy_at(offset, buffer)?;
            offset += buffer.len();
        }
    }
    Ok(merged)
}

/// Apply the requested sort to a combined output.
///
/// `DescendingLexical` reverses whatever order the sequence already has
/// rather than performing a true descending lexicographic sort; existing
/// callers depend on that behavior. On per-partition output only the
/// reverse applies, to the slot order.
pub fn apply_sort(output: &mut TaskOutput, order: SortOrder) {
    match output {
        TaskOutput::Single(seq) => match order {
            SortOrder::Ascending => seq.sort_numeric(false),
            SortOrder::Descending => seq.sort_numeric(true),
            SortOrder::AscendingLexical => seq.sort_lexical(),
            SortOrder::DescendingLexical => seq.reverse(),
        },
        TaskOutput::PerPartition(slots) => {
            if order == SortOrder::DescendingLexical {
                slots.reverse();
            }
        }
    }
}
