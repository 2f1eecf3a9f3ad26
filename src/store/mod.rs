//! Chunk stores: backends that serve rectangular sub-blocks of named
//! N-dimensional arrays.
//!
//! A store is a thin, stateless coordination layer over backend reads and
//! writes. Backends differ in where chunks live:
//! - [`MemoryChunkStore`]: whole arrays held in memory, fixed at
//!   construction.
//! - [`ObjectChunkStore`]: one object per chunk in any
//!   [`object_store::ObjectStore`], arrays coming into being on first write.
//!
//! [`ChunkedArrayHandle`] bridges a store to the lazy indexing layer by
//! presenting a named, chunked array as a single addressable array.

mod chunked;
mod memory;
mod object;

use std::ops::Range;
use std::sync::Arc;

pub use chunked::{ChunkedArrayHandle, FillPolicy};
pub use memory::MemoryChunkStore;
pub use object::ObjectChunkStore;

use crate::data::ArrayData;
use crate::dtype::DType;
use crate::errors::{StoreError, StoreResult};

/// Separator for hierarchical array names. The components between
/// separators must be non-empty.
pub const NAME_SEP: char = '/';

/// One per-dimension slice of a chunk request.
///
/// Chunks are always dense: any step other than 1 is rejected with a
/// bad-chunk error when the request is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSlice {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl ChunkSlice {
    pub fn new(start: usize, stop: usize) -> ChunkSlice {
        ChunkSlice {
            start,
            stop,
            step: 1,
        }
    }

    pub fn with_step(mut self, step: usize) -> ChunkSlice {
        self.step = step;
        self
    }

    /// Number of selected indices, assuming unit step.
    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.stop
    }
}

impl From<Range<usize>> for ChunkSlice {
    fn from(r: Range<usize>) -> ChunkSlice {
        ChunkSlice::new(r.start, r.end)
    }
}

/// Convert unit-step ranges into chunk slices.
pub fn slices(ranges: &[Range<usize>]) -> Vec<ChunkSlice> {
    ranges.iter().cloned().map(ChunkSlice::from).collect()
}

/// Build a hierarchical array name from parts.
///
/// Deterministic and associative: a part may itself be a joined name, so
/// `join(&[&join(&["a", "b"]), "c"])` equals `join(&["a", &join(&["b", "c"])])`.
/// A part with an empty component (an empty part, or a leading, trailing or
/// doubled separator) is a programming error and fails fast.
pub fn join(parts: &[&str]) -> String {
    for part in parts {
        assert!(
            !part.is_empty() && part.split(NAME_SEP).all(|c| !c.is_empty()),
            "array name part {part:?} has an empty component"
        );
    }
    parts.join("/")
}

/// Canonical identity of the chunk at the given location, e.g.
/// `cb1/correlator_data/00010_00000_00000`.
pub fn chunk_name(array_name: &str, slices: &[ChunkSlice]) -> String {
    let starts: Vec<String> = slices.iter().map(|s| format!("{:05}", s.start)).collect();
    format!("{}/{}", array_name, starts.join("_"))
}

/// Validate a chunk request and derive its identity and shape.
///
/// Rejects with [`StoreError::BadChunk`] when any slice has a non-unit step
/// or inverted bounds, when the request falls outside a known array shape,
/// or when a supplied chunk disagrees with the requested dtype or the
/// target shape. On the write path the shape is derived from `chunk`.
pub fn chunk_metadata(
    array_name: &str,
    request: &[ChunkSlice],
    dtype: Option<DType>,
    chunk: Option<&ArrayData>,
    array_shape: Option<&[usize]>,
) -> StoreResult<(String, Vec<usize>)> {
    let name = chunk_name(array_name, request);
    for (axis, s) in request.iter().enumerate() {
        if s.step != 1 {
            return Err(StoreError::bad_chunk(
                &name,
                format!("non-unit step {} on axis {axis}", s.step),
            ));
        }
        if s.start > s.stop {
            return Err(StoreError::bad_chunk(
                &name,
                format!("inverted slice {}..{} on axis {axis}", s.start, s.stop),
            ));
        }
    }
    if let Some(shape) = array_shape {
        if request.len() != shape.len() {
            return Err(StoreError::bad_chunk(
                &name,
                format!(
                    "request has {} dimensions but array has {}",
                    request.len(),
                    shape.len()
                ),
            ));
        }
        for (axis, (s, &len)) in request.iter().zip(shape).enumerate() {
            if s.stop > len {
                return Err(StoreError::bad_chunk(
                    &name,
                    format!(
                        "slice {}..{} out of bounds on axis {axis} of length {len}",
                        s.start, s.stop
                    ),
                ));
            }
        }
    }
    let shape: Vec<usize> = request.iter().map(ChunkSlice::len).collect();
    if let Some(chunk) = chunk {
        if chunk.shape() != shape.as_slice() {
            return Err(StoreError::bad_chunk(
                &name,
                format!(
                    "chunk shape {:?} differs from request shape {:?}",
                    chunk.shape(),
                    shape
                ),
            ));
        }
        if let Some(dtype) = dtype {
            if chunk.dtype() != dtype {
                return Err(StoreError::bad_chunk(
                    &name,
                    format!(
                        "requested dtype {} differs from chunk dtype {}",
                        dtype,
                        chunk.dtype()
                    ),
                ));
            }
        }
    }
    Ok((name, shape))
}

/// Capability contract every chunk store backend supplies.
///
/// `get` must be safe under concurrent, non-overlapping access; concurrent
/// writes to overlapping regions are undefined and must be serialized by
/// the caller. A failed `get` or `put` leaves no partial mutation of the
/// target array, so callers may retry idempotently.
pub trait ChunkStore: Send + Sync {
    /// Read the sub-array at the given location.
    ///
    /// Fails with [`StoreError::ChunkNotFound`] when the backend has no
    /// data for the chunk identity, and [`StoreError::BadChunk`] when the
    /// request is malformed or the stored data disagrees with the
    /// requested dtype.
    fn get(&self, array_name: &str, request: &[ChunkSlice], dtype: DType)
        -> StoreResult<ArrayData>;

    /// Write `chunk` into the named array at the given location. Whether an
    /// unknown array name is an error or creates the chunk is up to the
    /// backend; no backend ever resizes an existing array.
    fn put(&self, array_name: &str, request: &[ChunkSlice], chunk: &ArrayData) -> StoreResult<()>;

    /// Whether the chunk at the given location exists, without reading it.
    ///
    /// A malformed request still fails with [`StoreError::BadChunk`].
    fn has(&self, array_name: &str, request: &[ChunkSlice]) -> StoreResult<bool>;

    /// See [`join`].
    fn join(&self, parts: &[&str]) -> String {
        join(parts)
    }
}

impl<T: ChunkStore + ?Sized> ChunkStore for Arc<T> {
    fn get(
        &self,
        array_name: &str,
        request: &[ChunkSlice],
        dtype: DType,
    ) -> StoreResult<ArrayData> {
        (**self).get(array_name, request, dtype)
    }

    fn put(&self, array_name: &str, request: &[ChunkSlice], chunk: &ArrayData) -> StoreResult<()> {
        (**self).put(array_name, request, chunk)
    }

    fn has(&self, array_name: &str, request: &[ChunkSlice]) -> StoreResult<bool> {
        (**self).has(array_name, request)
    }
}

/// A type-erased chunk store that can be shared across threads.
pub type DynChunkStore = Arc<dyn ChunkStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_associative() {
        assert_eq!(join(&["cb1", "flags"]), "cb1/flags");
        assert_eq!(
            join(&[&join(&["a", "b"]), "c"]),
            join(&["a", &join(&["b", "c"])])
        );
        // Already-joined names are valid parts.
        assert_eq!(join(&["cb1/flags", "00000_00000"]), "cb1/flags/00000_00000");
    }

    #[test]
    #[should_panic(expected = "empty component")]
    fn join_rejects_empty_component() {
        join(&["cb1//flags", "oops"]);
    }

    #[test]
    #[should_panic(expected = "empty component")]
    fn join_rejects_empty_part() {
        join(&["cb1", ""]);
    }

    #[test]
    fn chunk_name_zero_pads_starts() {
        let request = slices(&[10..20, 0..4, 128..192]);
        assert_eq!(chunk_name("cb1/vis", &request), "cb1/vis/00010_00000_00128");
    }

    #[test]
    fn non_unit_step_is_bad_chunk() {
        let request = vec![ChunkSlice::new(0, 4).with_step(2)];
        let err = chunk_metadata("x", &request, None, None, Some(&[4])).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
    }

    #[test]
    fn out_of_bounds_is_bad_chunk() {
        let request = slices(&[2..9]);
        let err = chunk_metadata("x", &request, None, None, Some(&[4])).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
    }

    #[test]
    fn write_path_derives_shape_from_chunk() {
        let chunk = ArrayData::zeros(DType::F32, &[2, 3]);
        let request = slices(&[4..6, 0..3]);
        let (name, shape) =
            chunk_metadata("x", &request, Some(DType::F32), Some(&chunk), None).unwrap();
        assert_eq!(name, "x/00004_00000");
        assert_eq!(shape, vec![2, 3]);
        // Mismatched chunk shape is rejected.
        let bad = slices(&[4..6, 0..2]);
        assert!(chunk_metadata("x", &bad, None, Some(&chunk), None).is_err());
    }
}
