//! Input partitioning.
//!
//! Splits an ordered input into contiguous, non-overlapping chunks of
//! near-equal size. The same range arithmetic drives owned slicing of
//! JSON sequences and view-based slicing of numeric buffers.

use std::ops::Range;

use fanout_core::{PoolError, Sequence};

/// Split `0..len` into chunks of `ceil(len / n)` elements.
///
/// The last chunk may be shorter. When `len < n`, fewer than `n` chunks
/// come back, each of length 1. An empty input yields one empty range so
/// the task still runs exactly one partition.
pub fn split_ranges(len: usize, n: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return vec![0..0];
    }
    let chunk = len.div_ceil(n.max(1));
    let mut ranges = Vec::with_capacity(n);
    let mut start = 0;
    while start < len {
        let end = (start + chunk).min(len);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Split `sequence` into at most `n` contiguous sub-sequences.
///
/// Fails with [`PoolError::InvalidPartitionCount`] when `n < 1` or `n`
/// exceeds the pool capacity. `n == 1` returns the whole sequence as a
/// single partition.
pub fn partition(
    sequence: &Sequence,
    n: usize,
    capacity: usize,
) -> Result<Vec<Sequence>, PoolError> {
    if n < 1 || n > capacity {
        return Err(PoolError::InvalidPartitionCount {
            requested: n,
            capacity,
        });
    }
    if n == 1 {
        return Ok(vec![sequence.clone()]);
    }
    Ok(split_ranges(sequence.len(), n)
        .into_iter()
        .map(|range| sequence.view(range))
        .collect())
}
