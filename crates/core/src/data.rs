//! Sequences, typed numeric buffers, and the shared output buffer.
//!
//! Task inputs and per-partition results are [`Sequence`] values: either
//! arbitrary JSON values or a fixed-element-width [`NumericBuffer`]. Both
//! split and recombine through the same range arithmetic — only the
//! slicing primitive differs.

use std::ops::Range;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PoolError;

/// Fixed-width element type tag for buffer-backed data.
///
/// Wire names match the request format (`uint8`, `float64`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "uint8-clamped")]
    U8Clamped,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "uint32")]
    U32,
    #[serde(rename = "int8")]
    I8,
    #[serde(rename = "int16")]
    I16,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "float32")]
    F32,
    #[serde(rename = "float64")]
    F64,
}

/// A contiguous buffer of fixed-width numeric elements, one variant per
/// [`DataKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum NumericBuffer {
    U8(Vec<u8>),
    U8Clamped(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! for_each_buffer {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            NumericBuffer::U8($v) => $body,
            NumericBuffer::U8Clamped($v) => $body,
            NumericBuffer::U16($v) => $body,
            NumericBuffer::U32($v) => $body,
            NumericBuffer::I8($v) => $body,
            NumericBuffer::I16($v) => $body,
            NumericBuffer::I32($v) => $body,
            NumericBuffer::F32($v) => $body,
            NumericBuffer::F64($v) => $body,
        }
    };
}

fn copy_into<T: Copy>(dst: &mut [T], offset: usize, src: &[T]) -> Result<(), PoolError> {
    let end = offset + src.len();
    if end > dst.len() {
        return Err(PoolError::BufferMismatch(format!(
            "range {}..{} exceeds buffer length {}",
            offset,
            end,
            dst.len()
        )));
    }
    dst[offset..end].copy_from_slice(src);
    Ok(())
}

impl NumericBuffer {
    /// Allocate a zero-filled buffer of `len` elements of the given kind.
    pub fn zeroed(kind: DataKind, len: usize) -> NumericBuffer {
        match kind {
            DataKind::U8 => NumericBuffer::U8(vec![0; len]),
            DataKind::U8Clamped => NumericBuffer::U8Clamped(vec![0; len]),
            DataKind::U16 => NumericBuffer::U16(vec![0; len]),
            DataKind::U32 => NumericBuffer::U32(vec![0; len]),
            DataKind::I8 => NumericBuffer::I8(vec![0; len]),
            DataKind::I16 => NumericBuffer::I16(vec![0; len]),
            DataKind::I32 => NumericBuffer::I32(vec![0; len]),
            DataKind::F32 => NumericBuffer::F32(vec![0.0; len]),
            DataKind::F64 => NumericBuffer::F64(vec![0.0; len]),
        }
    }

    /// The element type tag of this buffer.
    pub fn kind(&self) -> DataKind {
        match self {
            NumericBuffer::U8(_) => DataKind::U8,
            NumericBuffer::U8Clamped(_) => DataKind::U8Clamped,
            NumericBuffer::U16(_) => DataKind::U16,
            NumericBuffer::U32(_) => DataKind::U32,
            NumericBuffer::I8(_) => DataKind::I8,
            NumericBuffer::I16(_) => DataKind::I16,
            NumericBuffer::I32(_) => DataKind::I32,
            NumericBuffer::F32(_) => DataKind::F32,
            NumericBuffer::F64(_) => DataKind::F64,
        }
    }

    pub fn len(&self) -> usize {
        for_each_buffer!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the elements in `range`. Panics if the range is out of
    /// bounds, like slice indexing.
    pub fn view(&self, range: Range<usize>) -> NumericBuffer {
        match self {
            NumericBuffer::U8(v) => NumericBuffer::U8(v[range].to_vec()),
            NumericBuffer::U8Clamped(v) => NumericBuffer::U8Clamped(v[range].to_vec()),
            NumericBuffer::U16(v) => NumericBuffer::U16(v[range].to_vec()),
            NumericBuffer::U32(v) => NumericBuffer::U32(v[range].to_vec()),
            NumericBuffer::I8(v) => NumericBuffer::I8(v[range].to_vec()),
            NumericBuffer::I16(v) => NumericBuffer::I16(v[range].to_vec()),
            NumericBuffer::I32(v) => NumericBuffer::I32(v[range].to_vec()),
            NumericBuffer::F32(v) => NumericBuffer::F32(v[range].to_vec()),
            NumericBuffer::F64(v) => NumericBuffer::F64(v[range].to_vec()),
        }
    }

    /// Copy `chunk` into this buffer starting at element `offset`.
    ///
    /// Fails when the element kinds differ or the target range falls
    /// outside the buffer.
    pub fn copy_at(&mut self, offset: usize, chunk: &NumericBuffer) -> Result<(), PoolError> {
        match (self, chunk) {
            (NumericBuffer::U8(dst), NumericBuffer::U8(src)) => copy_into(dst, offset, src),
            (NumericBuffer::U8Clamped(dst), NumericBuffer::U8Clamped(src)) => {
                copy_into(dst, offset, src)
            }
            (NumericBuffer::U16(dst), NumericBuffer::U16(src)) => copy_into(dst, offset, src),
            (NumericBuffer::U32(dst), NumericBuffer::U32(src)) => copy_into(dst, offset, src),
            (NumericBuffer::I8(dst), NumericBuffer::I8(src)) => copy_into(dst, offset, src),
            (NumericBuffer::I16(dst), NumericBuffer::I16(src)) => copy_into(dst, offset, src),
            (NumericBuffer::I32(dst), NumericBuffer::I32(src)) => copy_into(dst, offset, src),
            (NumericBuffer::F32(dst), NumericBuffer::F32(src)) => copy_into(dst, offset, src),
            (NumericBuffer::F64(dst), NumericBuffer::F64(src)) => copy_into(dst, offset, src),
            (dst, src) => Err(PoolError::BufferMismatch(format!(
                "cannot copy {:?} elements into {:?} buffer",
                src.kind(),
                dst.kind()
            ))),
        }
    }

    /// The buffer's elements as JSON values, in order.
    pub fn to_values(&self) -> Vec<Value> {
        match self {
            NumericBuffer::U8(v) => v.iter().map(|x| Value::from(*x)).collect(),
            NumericBuffer::U8Clamped(v) => v.iter().map(|x| Value::from(*x)).collect(),
            NumericBuffer::U16(v) => v.iter().map(|x| Value::from(*x)).collect(),
            NumericBuffer::U32(v) => v.iter().map(|x| Value::from(*x)).collect(),
            NumericBuffer::I8(v) => v.iter().map(|x| Value::from(*x)).collect(),
            NumericBuffer::I16(v) => v.iter().map(|x| Value::from(*x)).collect(),
            NumericBuffer::I32(v) => v.iter().map(|x| Value::from(*x)).collect(),
            NumericBuffer::F32(v) => v.iter().map(|x| Value::from(*x)).collect(),
            NumericBuffer::F64(v) => v.iter().map(|x| Value::from(*x)).collect(),
        }
    }

    /// Sort elements numerically in place. Float comparisons fall back to
    /// equal when incomparable.
    pub fn sort(&mut self, descending: bool) {
        for_each_buffer!(self, v => {
            v.sort_by(|a, b| {
                let ord = a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);
                if descending { ord.reverse() } else { ord }
            });
        });
    }

    /// Reverse element order in place.
    pub fn reverse(&mut self) {
        for_each_buffer!(self, v => v.reverse());
    }
}

/// An ordered input or result sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Sequence {
    /// Arbitrary JSON values.
    Values(Vec<Value>),
    /// Fixed-element-width buffer-backed data.
    Numeric(NumericBuffer),
}

impl Sequence {
    pub fn len(&self) -> usize {
        match self {
            Sequence::Values(v) => v.len(),
            Sequence::Numeric(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element kind when buffer-backed, `None` for JSON values.
    pub fn data_kind(&self) -> Option<DataKind> {
        match self {
            Sequence::Values(_) => None,
            Sequence::Numeric(b) => Some(b.kind()),
        }
    }

    /// Owned copy of the elements in `range`. Panics if the range is out
    /// of bounds, like slice indexing.
    pub fn view(&self, range: Range<usize>) -> Sequence {
        match self {
            Sequence::Values(v) => Sequence::Values(v[range].to_vec()),
            Sequence::Numeric(b) => Sequence::Numeric(b.view(range)),
        }
    }

    /// Sort numerically in place. JSON values compare by their numeric
    /// interpretation; non-numbers compare equal.
    pub fn sort_numeric(&mut self, descending: bool) {
        match self {
            Sequence::Values(values) => {
                values.sort_by(|a, b| {
                    let x = a.as_f64().unwrap_or(f64::NAN);
                    let y = b.as_f64().unwrap_or(f64::NAN);
                    let ord = x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal);
                    if descending { ord.reverse() } else { ord }
                });
            }
            Sequence::Numeric(buffer) => buffer.sort(descending),
        }
    }

    /// Sort lexicographically in place. Buffer-backed sequences sort
    /// numerically — there is no string form to compare.
    pub fn sort_lexical(&mut self) {
        match self {
            Sequence::Values(values) => {
                values.sort_by_cached_key(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                });
            }
            Sequence::Numeric(buffer) => buffer.sort(false),
        }
    }

    /// Reverse element order in place.
    pub fn reverse(&mut self) {
        match self {
            Sequence::Values(values) => values.reverse(),
            Sequence::Numeric(buffer) => buffer.reverse(),
        }
    }
}

/// A preallocated output buffer shared across execution units.
///
/// Each partition writes a disjoint range; ranges are computed from the
/// partition split, so writers never overlap. Reads and writes go through
/// the lock, but contention is bounded to one write per partition.
#[derive(Debug)]
pub struct SharedBuffer {
    kind: DataKind,
    cells: RwLock<NumericBuffer>,
}

impl SharedBuffer {
    /// Allocate a zero-filled shared buffer of `len` elements.
    pub fn zeroed(kind: DataKind, len: usize) -> SharedBuffer {
        SharedBuffer {
            kind,
            cells: RwLock::new(NumericBuffer::zeroed(kind, len)),
        }
    }

    /// Wrap an existing buffer.
    pub fn from_buffer(buffer: NumericBuffer) -> SharedBuffer {
        SharedBuffer {
            kind: buffer.kind(),
            cells: RwLock::new(buffer),
        }
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.cells.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the elements in `range`.
    pub fn view(&self, range: Range<usize>) -> Result<NumericBuffer, PoolError> {
        let cells = self.cells.read().unwrap();
        if range.end > cells.len() {
            return Err(PoolError::BufferMismatch(format!(
                "range {}..{} exceeds shared buffer length {}",
                range.start,
                range.end,
                cells.len()
            )));
        }
        Ok(cells.view(range))
    }

    /// Write `chunk` at element `offset`. Kind and bounds are checked;
    /// callers are responsible for keeping ranges disjoint.
    pub fn write_range(&self, offset: usize, chunk: &NumericBuffer) -> Result<(), PoolError> {
        self.cells.write().unwrap().copy_at(offset, chunk)
    }

    /// Clone of the current contents.
    pub fn snapshot(&self) -> NumericBuffer {
        self.cells.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_kind_wire_names() {
        let kind: DataKind = serde_json::from_str("\"uint32\"").unwrap();
        assert_eq!(kind, DataKind::U32);
        let kind: DataKind = serde_json::from_str("\"uint8-clamped\"").unwrap();
        assert_eq!(kind, DataKind::U8Clamped);
        assert_eq!(serde_json::to_string(&DataKind::F64).unwrap(), "\"float64\"");
    }

    #[test]
    fn zeroed_buffer_has_kind_and_len() {
        let buf = NumericBuffer::zeroed(DataKind::I16, 7);
        assert_eq!(buf.kind(), DataKind::I16);
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn copy_at_places_elements() {
        let mut dst = NumericBuffer::zeroed(DataKind::U32, 6);
        dst.copy_at(2, &NumericBuffer::U32(vec![7, 8])).unwrap();
        assert_eq!(dst, NumericBuffer::U32(vec![0, 0, 7, 8, 0, 0]));
    }

    #[test]
    fn copy_at_rejects_kind_mismatch() {
        let mut dst = NumericBuffer::zeroed(DataKind::U32, 4);
        let err = dst.copy_at(0, &NumericBuffer::F64(vec![1.0])).unwrap_err();
        assert!(matches!(err, PoolError::BufferMismatch(_)));
    }

    #[test]
    fn copy_at_rejects_overflow() {
        let mut dst = NumericBuffer::zeroed(DataKind::U8, 2);
        let err = dst.copy_at(1, &NumericBuffer::U8(vec![1, 2])).unwrap_err();
        assert!(matches!(err, PoolError::BufferMismatch(_)));
    }

    #[test]
    fn sequence_view_is_contiguous_copy() {
        let seq = Sequence::Values(vec![json!(1), json!(2), json!(3), json!(4)]);
        assert_eq!(
            seq.view(1..3),
            Sequence::Values(vec![json!(2), json!(3)])
        );
    }

    #[test]
    fn numeric_sort_descending() {
        let mut seq = Sequence::Numeric(NumericBuffer::I32(vec![3, 1, 2]));
        seq.sort_numeric(true);
        assert_eq!(seq, Sequence::Numeric(NumericBuffer::I32(vec![3, 2, 1])));
    }

    #[test]
    fn lexical_sort_uses_string_form() {
        let mut seq = Sequence::Values(vec![json!("pear"), json!("apple"), json!("fig")]);
        seq.sort_lexical();
        assert_eq!(
            seq,
            Sequence::Values(vec![json!("apple"), json!("fig"), json!("pear")])
        );
    }

    #[test]
    fn shared_buffer_disjoint_writes() {
        let shared = SharedBuffer::zeroed(DataKind::U32, 5);
        shared.write_range(0, &NumericBuffer::U32(vec![1, 2])).unwrap();
        shared.write_range(2, &NumericBuffer::U32(vec![3, 4, 5])).unwrap();
        assert_eq!(shared.snapshot(), NumericBuffer::U32(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn shared_buffer_view_bounds_checked() {
        let shared = SharedBuffer::zeroed(DataKind::U8, 3);
        assert!(shared.view(1..3).is_ok());
        assert!(shared.view(2..5).is_err());
    }
}
