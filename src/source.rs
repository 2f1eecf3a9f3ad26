//! The seam between array storage and lazy indexing.

use std::ops::Range;
use std::sync::Arc;

use crate::data::ArrayData;
use crate::dtype::DType;
use crate::errors::{StoreError, StoreResult};

/// An addressable N-dimensional array that can produce rectangular
/// sub-blocks on demand.
///
/// Implemented by in-memory arrays and by chunked store handles; a lazy
/// indexer only ever talks to this trait, so it neither knows nor cares
/// where its backing data lives.
pub trait ArraySource: Send + Sync {
    fn shape(&self) -> &[usize];

    fn dtype(&self) -> DType;

    /// Pull the sub-block covered by one unit-step range per dimension.
    /// This is the only operation that may touch backing storage.
    fn read(&self, ranges: &[Range<usize>]) -> StoreResult<ArrayData>;
}

impl ArraySource for ArrayData {
    fn shape(&self) -> &[usize] {
        ArrayData::shape(self)
    }

    fn dtype(&self) -> DType {
        ArrayData::dtype(self)
    }

    fn read(&self, ranges: &[Range<usize>]) -> StoreResult<ArrayData> {
        let shape = ArrayData::shape(self);
        if ranges.len() != shape.len() {
            return Err(StoreError::bad_chunk(
                "<memory>",
                format!(
                    "request has {} dimensions but array has {}",
                    ranges.len(),
                    shape.len()
                ),
            ));
        }
        for (axis, (r, &len)) in ranges.iter().zip(shape).enumerate() {
            if r.start > r.end || r.end > len {
                return Err(StoreError::bad_chunk(
                    "<memory>",
                    format!("range {r:?} out of bounds on axis {axis} of length {len}"),
                ));
            }
        }
        Ok(self.slice_ranges(ranges))
    }
}

impl<T: ArraySource + ?Sized> ArraySource for Arc<T> {
    fn shape(&self) -> &[usize] {
        (**self).shape()
    }

    fn dtype(&self) -> DType {
        (**self).dtype()
    }

    fn read(&self, ranges: &[Range<usize>]) -> StoreResult<ArrayData> {
        (**self).read(ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn memory_array_serves_sub_blocks() {
        let data = ArrayData::I32(
            ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1, 2, 3, 4, 5, 6]).unwrap(),
        );
        let block = data.read(&[1..2, 1..3]).unwrap();
        assert_eq!(
            block,
            ArrayData::I32(ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![5, 6]).unwrap())
        );
        assert!(data.read(&[0..3, 0..3]).is_err());
    }
}
