//! Whole-array in-memory chunk store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::data::ArrayData;
use crate::dtype::DType;
use crate::errors::{StoreError, StoreResult};

use super::{chunk_metadata, chunk_name, ChunkSlice, ChunkStore};

/// A store of chunks based on a map of named in-memory arrays.
///
/// All arrays need to be in place at store initialisation (or added
/// afterwards via [`MemoryChunkStore::insert`]); `put` only mutates
/// existing arrays in place and never creates one. An unknown array name
/// maps to [`StoreError::ChunkNotFound`], mirroring how a missing object
/// is reported by the object backend.
///
/// Individual `put`s take a write lock and are atomic, but interleaving of
/// concurrent overlapping writes is up to the caller to prevent.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    arrays: RwLock<BTreeMap<String, ArrayData>>,
}

impl MemoryChunkStore {
    pub fn new() -> MemoryChunkStore {
        MemoryChunkStore::default()
    }

    /// Build a store from `(name, array)` pairs.
    pub fn from_arrays<I, N>(arrays: I) -> MemoryChunkStore
    where
        I: IntoIterator<Item = (N, ArrayData)>,
        N: Into<String>,
    {
        let store = MemoryChunkStore::new();
        for (name, data) in arrays {
            store.insert(name, data);
        }
        store
    }

    /// Add or replace a whole named array.
    pub fn insert(&self, name: impl Into<String>, data: ArrayData) {
        self.arrays
            .write()
            .expect("array map lock poisoned")
            .insert(name.into(), data);
    }

    /// Shape of a named array, if present.
    pub fn array_shape(&self, name: &str) -> Option<Vec<usize>> {
        self.arrays
            .read()
            .expect("array map lock poisoned")
            .get(name)
            .map(|a| a.shape().to_vec())
    }
}

impl ChunkStore for MemoryChunkStore {
    fn get(
        &self,
        array_name: &str,
        request: &[ChunkSlice],
        dtype: DType,
    ) -> StoreResult<ArrayData> {
        // Malformed requests are bad chunks whether or not the array exists.
        chunk_metadata(array_name, request, None, None, None)?;
        let arrays = self.arrays.read().expect("array map lock poisoned");
        let array = arrays.get(array_name).ok_or_else(|| {
            StoreError::chunk_not_found(
                chunk_name(array_name, request),
                format!("array {array_name:?} not in store"),
            )
        })?;
        let (name, _) = chunk_metadata(
            array_name,
            request,
            Some(dtype),
            None,
            Some(array.shape()),
        )?;
        if array.dtype() != dtype {
            return Err(StoreError::bad_chunk(
                name,
                format!(
                    "requested dtype {} differs from actual dtype {}",
                    dtype,
                    array.dtype()
                ),
            ));
        }
        let ranges: Vec<_> = request.iter().map(ChunkSlice::range).collect();
        Ok(array.slice_ranges(&ranges))
    }

    fn put(&self, array_name: &str, request: &[ChunkSlice], chunk: &ArrayData) -> StoreResult<()> {
        chunk_metadata(array_name, request, None, Some(chunk), None)?;
        let mut arrays = self.arrays.write().expect("array map lock poisoned");
        let array = arrays.get_mut(array_name).ok_or_else(|| {
            StoreError::chunk_not_found(
                chunk_name(array_name, request),
                format!("array {array_name:?} not in store"),
            )
        })?;
        chunk_metadata(
            array_name,
            request,
            Some(array.dtype()),
            Some(chunk),
            Some(array.shape()),
        )?;
        let ranges: Vec<_> = request.iter().map(ChunkSlice::range).collect();
        array.assign_ranges(&ranges, chunk);
        Ok(())
    }

    fn has(&self, array_name: &str, request: &[ChunkSlice]) -> StoreResult<bool> {
        chunk_metadata(array_name, request, None, None, None)?;
        let arrays = self.arrays.read().expect("array map lock poisoned");
        // Whole arrays live in memory, so a chunk exists exactly when its
        // array does and the request stays in bounds.
        Ok(arrays.get(array_name).is_some_and(|array| {
            chunk_metadata(array_name, request, None, None, Some(array.shape())).is_ok()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::slices;
    use ndarray::{ArrayD, IxDyn};

    fn ramp(shape: &[usize]) -> ArrayData {
        let n: usize = shape.iter().product();
        ArrayData::F32(
            ArrayD::from_shape_vec(IxDyn(shape), (0..n).map(|i| i as f32).collect()).unwrap(),
        )
    }

    #[test]
    fn get_returns_exact_sub_block() {
        let vis = ramp(&[4, 2, 1]);
        let store = MemoryChunkStore::from_arrays([("vis", vis.clone())]);
        let block = store
            .get("vis", &slices(&[1..3, 0..2, 0..1]), DType::F32)
            .unwrap();
        assert_eq!(block, vis.slice_ranges(&[1..3, 0..2, 0..1]));
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = MemoryChunkStore::from_arrays([("x", ArrayData::zeros(DType::F32, &[4, 4]))]);
        let chunk = ramp(&[2, 4]);
        store.put("x", &slices(&[2..4, 0..4]), &chunk).unwrap();
        assert_eq!(store.get("x", &slices(&[2..4, 0..4]), DType::F32).unwrap(), chunk);
    }

    #[test]
    fn unknown_array_is_chunk_not_found() {
        let store = MemoryChunkStore::new();
        let err = store.get("ghost", &slices(&[0..1]), DType::F32).unwrap_err();
        assert!(err.is_not_found());
        let err = store
            .put("ghost", &slices(&[0..1]), &ramp(&[1]))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn malformed_request_on_unknown_array_is_bad_chunk() {
        let store = MemoryChunkStore::new();
        let request = vec![ChunkSlice::new(0, 4).with_step(2)];
        let err = store.get("ghost", &request, DType::F32).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
        let err = store.put("ghost", &request, &ramp(&[4])).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
        let err = store.has("ghost", &request).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
    }

    #[test]
    fn has_reports_existence_without_reading() {
        let store = MemoryChunkStore::from_arrays([("x", ramp(&[4]))]);
        assert!(store.has("x", &slices(&[0..2])).unwrap());
        assert!(!store.has("ghost", &slices(&[0..2])).unwrap());
        assert!(!store.has("x", &slices(&[2..9])).unwrap());
    }

    #[test]
    fn non_unit_step_get_is_bad_chunk() {
        let store = MemoryChunkStore::from_arrays([("x", ramp(&[4]))]);
        let request = vec![ChunkSlice::new(0, 4).with_step(2)];
        let err = store.get("x", &request, DType::F32).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
    }

    #[test]
    fn dtype_mismatch_is_bad_chunk() {
        let store = MemoryChunkStore::from_arrays([("x", ramp(&[4]))]);
        let err = store.get("x", &slices(&[0..4]), DType::U8).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
    }

    #[test]
    fn put_shape_mismatch_leaves_array_untouched() {
        let store = MemoryChunkStore::from_arrays([("x", ArrayData::zeros(DType::F32, &[4]))]);
        let err = store.put("x", &slices(&[0..3]), &ramp(&[2])).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
        assert_eq!(
            store.get("x", &slices(&[0..4]), DType::F32).unwrap(),
            ArrayData::zeros(DType::F32, &[4])
        );
    }
}
