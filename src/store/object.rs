//! Chunk-per-object store over any [`object_store::ObjectStore`].
//!
//! Each chunk is one object keyed by its canonical chunk identity, encoded
//! with the chunk object codec in [`crate::ArrayData`]. Arrays are not
//! declared anywhere: they come into being when their first chunk is
//! written, and a read of an absent chunk reports the backend's not-found
//! signal as [`StoreError::ChunkNotFound`].
//!
//! The public surface is synchronous; the store owns a private tokio
//! runtime that drives the async object requests. Multiple threads may
//! block on that runtime concurrently, which is what gives a chunked
//! handle its parallel fetch path.

use std::sync::Arc;

use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use snafu::ResultExt;

use crate::data::ArrayData;
use crate::dtype::DType;
use crate::errors::{CreateRuntimeSnafu, StoreError, StoreResult, StoreSetupSnafu};

use super::{chunk_metadata, ChunkSlice, ChunkStore};

pub struct ObjectChunkStore {
    store: Arc<dyn ObjectStore>,
    runtime: tokio::runtime::Runtime,
}

impl ObjectChunkStore {
    /// Wrap an already-configured object store backend.
    pub fn new(store: Arc<dyn ObjectStore>) -> StoreResult<ObjectChunkStore> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context(CreateRuntimeSnafu)?;
        log::debug!("object chunk store ready");
        Ok(ObjectChunkStore { store, runtime })
    }

    /// An ephemeral store holding chunk objects in memory.
    pub fn memory() -> StoreResult<ObjectChunkStore> {
        ObjectChunkStore::new(Arc::new(object_store::memory::InMemory::new()))
    }

    /// A store rooted at a local directory, one file per chunk.
    pub fn local(root: impl AsRef<std::path::Path>) -> StoreResult<ObjectChunkStore> {
        let fs = object_store::local::LocalFileSystem::new_with_prefix(root)
            .context(StoreSetupSnafu)?;
        ObjectChunkStore::new(Arc::new(fs))
    }

    fn translate(chunk: &str, err: object_store::Error) -> StoreError {
        if matches!(err, object_store::Error::NotFound { .. }) {
            StoreError::chunk_not_found(chunk, err.to_string())
        } else {
            StoreError::bad_chunk(chunk, err.to_string())
        }
    }
}

impl ChunkStore for ObjectChunkStore {
    fn get(
        &self,
        array_name: &str,
        request: &[ChunkSlice],
        dtype: DType,
    ) -> StoreResult<ArrayData> {
        let (name, shape) = chunk_metadata(array_name, request, Some(dtype), None, None)?;
        let path = ObjectPath::from(name.clone());
        let store = self.store.clone();
        let bytes = self
            .runtime
            .block_on(async move { store.get(&path).await?.bytes().await })
            .map_err(|e| ObjectChunkStore::translate(&name, e))?;
        let data = ArrayData::from_bytes(&bytes)
            .map_err(|reason| StoreError::bad_chunk(name.as_str(), reason))?;
        if data.dtype() != dtype {
            return Err(StoreError::bad_chunk(
                name,
                format!(
                    "requested dtype {} differs from stored dtype {}",
                    dtype,
                    data.dtype()
                ),
            ));
        }
        if data.shape() != shape.as_slice() {
            return Err(StoreError::bad_chunk(
                name,
                format!(
                    "stored shape {:?} differs from request shape {:?}",
                    data.shape(),
                    shape
                ),
            ));
        }
        Ok(data)
    }

    fn put(&self, array_name: &str, request: &[ChunkSlice], chunk: &ArrayData) -> StoreResult<()> {
        let (name, _) = chunk_metadata(array_name, request, None, Some(chunk), None)?;
        let path = ObjectPath::from(name.clone());
        let payload = PutPayload::from(chunk.to_bytes());
        let store = self.store.clone();
        self.runtime
            .block_on(async move { store.put(&path, payload).await })
            .map_err(|e| ObjectChunkStore::translate(&name, e))?;
        Ok(())
    }

    fn has(&self, array_name: &str, request: &[ChunkSlice]) -> StoreResult<bool> {
        let (name, _) = chunk_metadata(array_name, request, None, None, None)?;
        let path = ObjectPath::from(name.clone());
        let store = self.store.clone();
        match self.runtime.block_on(async move { store.head(&path).await }) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(ObjectChunkStore::translate(&name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::slices;
    use ndarray::{ArrayD, IxDyn};
    use num_complex::Complex32;

    fn vis_chunk() -> ArrayData {
        ArrayData::C64(
            ArrayD::from_shape_vec(
                IxDyn(&[2, 2, 1]),
                vec![
                    Complex32::new(1.0, -1.0),
                    Complex32::new(2.0, -2.0),
                    Complex32::new(3.0, -3.0),
                    Complex32::new(4.0, -4.0),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn put_then_get_round_trips_in_memory() {
        let store = ObjectChunkStore::memory().unwrap();
        let chunk = vis_chunk();
        let request = slices(&[4..6, 0..2, 0..1]);
        store.put("cb1/vis", &request, &chunk).unwrap();
        assert_eq!(store.get("cb1/vis", &request, DType::C64).unwrap(), chunk);
    }

    #[test]
    fn absent_chunk_is_chunk_not_found() {
        let store = ObjectChunkStore::memory().unwrap();
        let err = store
            .get("cb1/vis", &slices(&[0..2, 0..2, 0..1]), DType::C64)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn has_reports_existence_without_reading() {
        let store = ObjectChunkStore::memory().unwrap();
        let request = slices(&[4..6, 0..2, 0..1]);
        assert!(!store.has("cb1/vis", &request).unwrap());
        store.put("cb1/vis", &request, &vis_chunk()).unwrap();
        assert!(store.has("cb1/vis", &request).unwrap());
        // Same array, different chunk location.
        assert!(!store.has("cb1/vis", &slices(&[6..8, 0..2, 0..1])).unwrap());
    }

    #[test]
    fn stored_dtype_mismatch_is_bad_chunk() {
        let store = ObjectChunkStore::memory().unwrap();
        let request = slices(&[0..2, 0..2, 0..1]);
        store.put("cb1/vis", &request, &vis_chunk()).unwrap();
        let err = store.get("cb1/vis", &request, DType::F32).unwrap_err();
        assert!(matches!(err, StoreError::BadChunk { .. }));
    }

    #[test]
    fn local_filesystem_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectChunkStore::local(dir.path()).unwrap();
        let chunk = ArrayData::zeros(DType::U8, &[3, 4]);
        let request = slices(&[0..3, 8..12]);
        store.put("cb1/flags", &request, &chunk).unwrap();
        assert_eq!(store.get("cb1/flags", &request, DType::U8).unwrap(), chunk);
    }
}
