//! Lazily-chunked array handles.
//!
//! A handle names one array in a chunk store together with its layout
//! (shape, per-dimension chunk sizes, dtype). Reading any sub-region issues
//! one `get` per covering chunk and assembles the results in canonical
//! index order, regardless of the order in which the fetches complete.
//! Fetches of distinct chunks are independent, so the handle can fan them
//! out across threads when asked to.

use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::data::ArrayData;
use crate::dtype::DType;
use crate::errors::{StoreError, StoreResult};
use crate::source::ArraySource;

use super::{chunk_name, slices, ChunkStore};

/// Per-dimension chunk grid index.
type GridIndex = SmallVec<[usize; 4]>;

/// What to do when a covering chunk is absent from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FillPolicy {
    /// Propagate the not-found error (the default).
    #[default]
    Error,
    /// Substitute zeros for the missing region and log the substitution.
    /// For uint8 flag arrays, `flag_bit` fills the region with that bit
    /// instead, marking the data as lost.
    ZeroFill { flag_bit: Option<u8> },
}

/// A named, chunked array served by a [`ChunkStore`].
#[derive(Clone)]
pub struct ChunkedArrayHandle {
    store: Arc<dyn ChunkStore>,
    name: String,
    shape: Vec<usize>,
    chunks: Vec<usize>,
    dtype: DType,
    fill: FillPolicy,
    parallel: bool,
}

impl ChunkedArrayHandle {
    /// A handle on array `name` with the given layout.
    ///
    /// Fails fast on a rank mismatch between `shape` and `chunks` or a
    /// zero chunk size; both are programming errors.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        name: impl Into<String>,
        shape: Vec<usize>,
        chunks: Vec<usize>,
        dtype: DType,
    ) -> ChunkedArrayHandle {
        assert_eq!(
            shape.len(),
            chunks.len(),
            "array shape and chunk sizes must have the same rank"
        );
        assert!(!shape.is_empty(), "zero-dimensional arrays are not chunked");
        assert!(
            chunks.iter().all(|&c| c > 0),
            "chunk sizes must be positive"
        );
        ChunkedArrayHandle {
            store,
            name: name.into(),
            shape,
            chunks,
            dtype,
            fill: FillPolicy::Error,
            parallel: false,
        }
    }

    /// Replace the missing-chunk policy.
    pub fn with_fill(mut self, fill: FillPolicy) -> ChunkedArrayHandle {
        if let FillPolicy::ZeroFill { flag_bit: Some(_) } = fill {
            assert_eq!(
                self.dtype,
                DType::U8,
                "flag bit fill only applies to uint8 arrays"
            );
        }
        self.fill = fill;
        self
    }

    /// Fetch covering chunks concurrently. Reads of distinct chunks are
    /// independent, so this is safe for any store; it is opt-in because
    /// small in-memory reads gain nothing from the fan-out.
    pub fn parallel(mut self) -> ChunkedArrayHandle {
        self.parallel = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chunks(&self) -> &[usize] {
        &self.chunks
    }

    /// Chunk grid indices covering `ranges`, in canonical (row-major)
    /// order.
    fn grid_cover(&self, ranges: &[Range<usize>]) -> Vec<GridIndex> {
        let per_dim: Vec<Range<usize>> = ranges
            .iter()
            .zip(&self.chunks)
            .map(|(r, &c)| {
                if r.start >= r.end {
                    0..0
                } else {
                    r.start / c..(r.end - 1) / c + 1
                }
            })
            .collect();
        let mut out = Vec::new();
        if per_dim.iter().any(|r| r.start >= r.end) {
            return out;
        }
        let mut cur: GridIndex = per_dim.iter().map(|r| r.start).collect();
        loop {
            out.push(cur.clone());
            let mut axis = cur.len();
            loop {
                if axis == 0 {
                    return out;
                }
                axis -= 1;
                cur[axis] += 1;
                if cur[axis] < per_dim[axis].end {
                    break;
                }
                cur[axis] = per_dim[axis].start;
            }
        }
    }

    /// Full extent of the chunk at grid index `id`, clamped to the array
    /// bounds on the ragged edge.
    fn chunk_extent(&self, id: &[usize]) -> Vec<Range<usize>> {
        id.iter()
            .zip(&self.chunks)
            .zip(&self.shape)
            .map(|((&i, &c), &len)| {
                let start = i * c;
                start..(start + c).min(len)
            })
            .collect()
    }

    fn validate_ranges(&self, ranges: &[Range<usize>]) -> StoreResult<()> {
        if ranges.len() != self.shape.len() {
            return Err(StoreError::bad_chunk(
                chunk_name(&self.name, &slices(ranges)),
                format!(
                    "request has {} dimensions but array has {}",
                    ranges.len(),
                    self.shape.len()
                ),
            ));
        }
        for (axis, (r, &len)) in ranges.iter().zip(&self.shape).enumerate() {
            if r.start > r.end || r.end > len {
                return Err(StoreError::bad_chunk(
                    chunk_name(&self.name, &slices(ranges)),
                    format!("range {r:?} out of bounds on axis {axis} of length {len}"),
                ));
            }
        }
        Ok(())
    }

    /// Read a sub-region, assembling it from the covering chunks.
    pub fn read(&self, ranges: &[Range<usize>]) -> StoreResult<ArrayData> {
        self.validate_ranges(ranges)?;
        let req_shape: Vec<usize> = ranges.iter().map(|r| r.end.saturating_sub(r.start)).collect();
        let ids = self.grid_cover(ranges);
        let fetch = |id: &GridIndex| {
            let extent = self.chunk_extent(id);
            let result = self.store.get(&self.name, &slices(&extent), self.dtype);
            (extent, result)
        };
        let fetched: Vec<(Vec<Range<usize>>, StoreResult<ArrayData>)> = if self.parallel {
            ids.par_iter().map(fetch).collect()
        } else {
            ids.iter().map(fetch).collect()
        };
        let mut out = ArrayData::zeros(self.dtype, &req_shape);
        for (extent, result) in fetched {
            let inter: Vec<Range<usize>> = extent
                .iter()
                .zip(ranges)
                .map(|(e, r)| e.start.max(r.start)..e.end.min(r.end))
                .collect();
            if inter.iter().any(|r| r.start >= r.end) {
                continue;
            }
            let dst: Vec<Range<usize>> = inter
                .iter()
                .zip(ranges)
                .map(|(i, r)| i.start - r.start..i.end - r.start)
                .collect();
            match result {
                Ok(chunk) => {
                    let src: Vec<Range<usize>> = inter
                        .iter()
                        .zip(&extent)
                        .map(|(i, e)| i.start - e.start..i.end - e.start)
                        .collect();
                    out.assign_ranges(&dst, &chunk.slice_ranges(&src));
                }
                Err(err) if err.is_not_found() && self.fill != FillPolicy::Error => {
                    log::warn!(
                        "array {}: missing chunk replaced with zeros ({err})",
                        self.name
                    );
                    if let FillPolicy::ZeroFill {
                        flag_bit: Some(bit),
                    } = self.fill
                    {
                        out.raise_u8_bits(&dst, bit);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    /// Clamped extents of the chunks covering `ranges` that are absent from
    /// the store, in canonical order.
    pub fn missing_chunks(&self, ranges: &[Range<usize>]) -> StoreResult<Vec<Vec<Range<usize>>>> {
        self.validate_ranges(ranges)?;
        let mut missing = Vec::new();
        for id in self.grid_cover(ranges) {
            let extent = self.chunk_extent(&id);
            if !self.store.has(&self.name, &slices(&extent))? {
                missing.push(extent);
            }
        }
        Ok(missing)
    }

    /// Write a sub-region, splitting it into one `put` per chunk.
    ///
    /// The region must be aligned to the chunk grid (each range starting on
    /// a chunk boundary and ending on one or at the array edge) so that
    /// every written object is a whole chunk; anything else is rejected
    /// with a bad-chunk error. Writes are sequential: concurrent writes to
    /// overlapping regions are undefined.
    pub fn write(&self, ranges: &[Range<usize>], data: &ArrayData) -> StoreResult<()> {
        self.validate_ranges(ranges)?;
        if data.dtype() != self.dtype {
            return Err(StoreError::bad_chunk(
                chunk_name(&self.name, &slices(ranges)),
                format!(
                    "data dtype {} differs from array dtype {}",
                    data.dtype(),
                    self.dtype
                ),
            ));
        }
        let req_shape: Vec<usize> = ranges.iter().map(|r| r.end.saturating_sub(r.start)).collect();
        if data.shape() != req_shape.as_slice() {
            return Err(StoreError::bad_chunk(
                chunk_name(&self.name, &slices(ranges)),
                format!(
                    "data shape {:?} differs from region shape {:?}",
                    data.shape(),
                    req_shape
                ),
            ));
        }
        for (axis, ((r, &c), &len)) in ranges.iter().zip(&self.chunks).zip(&self.shape).enumerate()
        {
            let aligned = r.start % c == 0 && (r.end % c == 0 || r.end == len);
            if !aligned && r.start < r.end {
                return Err(StoreError::bad_chunk(
                    chunk_name(&self.name, &slices(ranges)),
                    format!(
                        "write region {r:?} not aligned to chunk grid (size {c}) on axis {axis}"
                    ),
                ));
            }
        }
        for id in self.grid_cover(ranges) {
            let extent = self.chunk_extent(&id);
            let src: Vec<Range<usize>> = extent
                .iter()
                .zip(ranges)
                .map(|(e, r)| e.start - r.start..e.end - r.start)
                .collect();
            self.store
                .put(&self.name, &slices(&extent), &data.slice_ranges(&src))?;
        }
        Ok(())
    }
}

impl ArraySource for ChunkedArrayHandle {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn read(&self, ranges: &[Range<usize>]) -> StoreResult<ArrayData> {
        ChunkedArrayHandle::read(self, ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectChunkStore;
    use ndarray::{ArrayD, IxDyn};

    fn ramp(shape: &[usize]) -> ArrayData {
        let n: usize = shape.iter().product();
        ArrayData::F32(
            ArrayD::from_shape_vec(IxDyn(shape), (0..n).map(|i| i as f32).collect()).unwrap(),
        )
    }

    fn handle(name: &str, shape: &[usize], chunks: &[usize]) -> ChunkedArrayHandle {
        let store = Arc::new(ObjectChunkStore::memory().unwrap());
        ChunkedArrayHandle::new(store, name, shape.to_vec(), chunks.to_vec(), DType::F32)
    }

    #[test]
    fn write_then_read_round_trips_across_chunks() {
        // Ragged edge on both axes: 6 rows in chunks of 4, 5 columns in
        // chunks of 2.
        let h = handle("cb1/x", &[6, 5], &[4, 2]);
        let reference = ramp(&[6, 5]);
        h.write(&[0..6, 0..5], &reference).unwrap();
        assert_eq!(h.read(&[0..6, 0..5]).unwrap(), reference);
        // Sub-regions crossing chunk boundaries.
        assert_eq!(
            h.read(&[3..6, 1..4]).unwrap(),
            reference.slice_ranges(&[3..6, 1..4])
        );
        assert_eq!(
            h.read(&[0..1, 4..5]).unwrap(),
            reference.slice_ranges(&[0..1, 4..5])
        );
    }

    #[test]
    fn parallel_read_matches_sequential() {
        let store: Arc<dyn crate::store::ChunkStore> =
            Arc::new(ObjectChunkStore::memory().unwrap());
        let h = ChunkedArrayHandle::new(
            Arc::clone(&store),
            "cb1/x",
            vec![8, 6],
            vec![2, 3],
            DType::F32,
        );
        let reference = ramp(&[8, 6]);
        h.write(&[0..8, 0..6], &reference).unwrap();
        let par =
            ChunkedArrayHandle::new(store, "cb1/x", vec![8, 6], vec![2, 3], DType::F32).parallel();
        assert_eq!(
            par.read(&[1..7, 2..6]).unwrap(),
            h.read(&[1..7, 2..6]).unwrap()
        );
    }

    #[test]
    fn unaligned_write_is_bad_chunk() {
        let h = handle("cb1/x", &[6, 5], &[4, 2]);
        let err = h.write(&[1..5, 0..5], &ramp(&[4, 5])).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
    }

    #[test]
    fn missing_chunk_propagates_by_default() {
        let h = handle("cb1/x", &[6, 5], &[4, 2]);
        assert!(h.read(&[0..6, 0..5]).unwrap_err().is_not_found());
    }

    #[test]
    fn zero_fill_substitutes_missing_chunks() {
        let h = handle("cb1/x", &[4, 4], &[2, 4]);
        let top = ramp(&[2, 4]);
        h.write(&[0..2, 0..4], &top).unwrap();
        let h = h.with_fill(FillPolicy::ZeroFill { flag_bit: None });
        let got = h.read(&[0..4, 0..4]).unwrap();
        assert_eq!(got.slice_ranges(&[0..2, 0..4]), top);
        assert_eq!(
            got.slice_ranges(&[2..4, 0..4]),
            ArrayData::zeros(DType::F32, &[2, 4])
        );
    }

    #[test]
    fn flag_bit_fill_marks_data_lost() {
        let store = Arc::new(ObjectChunkStore::memory().unwrap());
        let h = ChunkedArrayHandle::new(store, "cb1/flags", vec![2, 2], vec![2, 2], DType::U8)
            .with_fill(FillPolicy::ZeroFill { flag_bit: Some(8) });
        assert_eq!(
            h.read(&[0..2, 0..2]).unwrap(),
            ArrayData::U8(ArrayD::from_elem(IxDyn(&[2, 2]), 8))
        );
    }

    #[test]
    fn missing_chunks_lists_unwritten_extents() {
        let h = handle("cb1/x", &[4, 4], &[2, 4]);
        h.write(&[0..2, 0..4], &ramp(&[2, 4])).unwrap();
        assert_eq!(h.missing_chunks(&[0..4, 0..4]).unwrap(), vec![vec![2..4, 0..4]]);
        assert!(h.missing_chunks(&[0..2, 0..4]).unwrap().is_empty());
    }

    #[test]
    fn out_of_bounds_read_is_bad_chunk() {
        let h = handle("cb1/x", &[6, 5], &[4, 2]);
        assert!(matches!(
            h.read(&[0..7, 0..5]).unwrap_err(),
            StoreError::BadChunk { .. }
        ));
    }
}
