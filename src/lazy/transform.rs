//! Named element-wise transforms for lazy indexers.

use std::fmt;
use std::sync::Arc;

use crate::data::ArrayData;
use crate::dtype::DType;
use crate::errors::{StoreError, StoreResult};
use crate::select::Selection;

type DataFn = dyn Fn(ArrayData, &Selection) -> StoreResult<ArrayData> + Send + Sync;
type ShapeFn = dyn Fn(&[usize]) -> Vec<usize> + Send + Sync;

/// A deferred transformation of array data.
///
/// The data function runs only when an indexer materialises data; shape and
/// dtype of the product are declared up front so the pipeline's geometry
/// stays a pure computation. A transform that declares neither leaves both
/// unchanged. The second-stage selection of the triggering `get` is passed
/// along so a transform can take it into account, but the selection itself
/// is applied after the whole chain has run.
#[derive(Clone)]
pub struct LazyTransform {
    name: String,
    data_fn: Arc<DataFn>,
    shape_fn: Option<Arc<ShapeFn>>,
    dtype: Option<DType>,
}

impl LazyTransform {
    pub fn new<F>(name: impl Into<String>, data_fn: F) -> LazyTransform
    where
        F: Fn(ArrayData, &Selection) -> StoreResult<ArrayData> + Send + Sync + 'static,
    {
        LazyTransform {
            name: name.into(),
            data_fn: Arc::new(data_fn),
            shape_fn: None,
            dtype: None,
        }
    }

    /// Declare how the transform changes the array shape.
    pub fn with_shape<F>(mut self, shape_fn: F) -> LazyTransform
    where
        F: Fn(&[usize]) -> Vec<usize> + Send + Sync + 'static,
    {
        self.shape_fn = Some(Arc::new(shape_fn));
        self
    }

    /// Declare the dtype of the transformed data.
    pub fn with_dtype(mut self, dtype: DType) -> LazyTransform {
        self.dtype = Some(dtype);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shape of the product given the input shape; touches no data.
    pub fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        match &self.shape_fn {
            Some(f) => f(input),
            None => input.to_vec(),
        }
    }

    /// Dtype of the product given the input dtype; touches no data.
    pub fn output_dtype(&self, input: DType) -> DType {
        self.dtype.unwrap_or(input)
    }

    pub fn apply(&self, data: ArrayData, stage2: &Selection) -> StoreResult<ArrayData> {
        (self.data_fn)(data, stage2)
    }
}

impl fmt::Debug for LazyTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTransform")
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .finish_non_exhaustive()
    }
}

/// Reduce a uint8 flag array to booleans: true where any of the bits in
/// `mask` is raised.
pub fn select_flag_bits(mask: u8) -> LazyTransform {
    LazyTransform::new(format!("select_flag_bits(0b{mask:08b})"), move |data, _| {
        match data {
            ArrayData::U8(a) => Ok(ArrayData::Bool(a.mapv(|v| v & mask != 0))),
            other => Err(StoreError::bad_chunk(
                "<transform>",
                format!("select_flag_bits needs uint8 input, got {}", other.dtype()),
            )),
        }
    })
    .with_dtype(DType::Bool)
}

/// Multiply floating-point data by a constant factor.
pub fn scale(factor: f64) -> LazyTransform {
    LazyTransform::new(format!("scale({factor})"), move |data, _| match data {
        ArrayData::F32(a) => Ok(ArrayData::F32(a.mapv(|v| v * factor as f32))),
        ArrayData::F64(a) => Ok(ArrayData::F64(a.mapv(|v| v * factor))),
        ArrayData::C64(a) => Ok(ArrayData::C64(a.mapv(|v| v * factor as f32))),
        other => Err(StoreError::bad_chunk(
            "<transform>",
            format!("scale needs floating-point input, got {}", other.dtype()),
        )),
    })
}

/// Pad trailing singleton dimensions until the data has `ndim` axes.
pub fn restore_singleton_dims(ndim: usize) -> LazyTransform {
    LazyTransform::new(format!("restore_singleton_dims({ndim})"), move |data, _| {
        let mut out = data;
        while out.ndim() < ndim {
            let pos = out.ndim();
            out = out.insert_axis(pos);
        }
        Ok(out)
    })
    .with_shape(move |shape| {
        let mut out = shape.to_vec();
        while out.len() < ndim {
            out.push(1);
        }
        out
    })
}
