//! Two-stage lazy indexing over an array source.

use std::fmt;
use std::sync::Arc;

use crate::data::ArrayData;
use crate::dtype::DType;
use crate::errors::StoreResult;
use crate::select::{AxisSelection, Selection};
use crate::source::ArraySource;

use super::LazyTransform;

/// An array source with a pinned first-stage selection and a chain of
/// deferred transforms.
///
/// Construction touches no data: the first-stage selection is validated
/// against the source geometry and the final shape and dtype are derived by
/// folding the transform declarations. Data moves only in [`get`], which
/// reads the minimal contiguous cover of the first-stage selection, applies
/// the residual selection, runs the transform chain, and finally applies
/// the caller's second-stage selection.
///
/// [`get`]: LazyIndexer::get
pub struct LazyIndexer {
    source: Arc<dyn ArraySource>,
    stage1: Selection,
    transforms: Vec<LazyTransform>,
    base_shape: Vec<usize>,
}

impl LazyIndexer {
    /// Pin `stage1` to `source`. A selection that does not fit the source
    /// geometry is a programming error and fails fast.
    pub fn new(source: Arc<dyn ArraySource>, stage1: Selection) -> LazyIndexer {
        stage1.validate(source.shape());
        let base_shape = stage1.output_shape(source.shape());
        LazyIndexer {
            source,
            stage1,
            transforms: Vec::new(),
            base_shape,
        }
    }

    /// An indexer over the whole source.
    pub fn over(source: Arc<dyn ArraySource>) -> LazyIndexer {
        let ndim = source.shape().len();
        LazyIndexer::new(source, Selection::full(ndim))
    }

    /// Append a transform to the chain.
    pub fn with_transform(mut self, transform: LazyTransform) -> LazyIndexer {
        self.transforms.push(transform);
        self
    }

    pub fn add_transform(&mut self, transform: LazyTransform) {
        self.transforms.push(transform);
    }

    pub fn transforms(&self) -> &[LazyTransform] {
        &self.transforms
    }

    /// Shape of the final product; pure, touches no data.
    pub fn shape(&self) -> Vec<usize> {
        self.transforms
            .iter()
            .fold(self.base_shape.clone(), |shape, t| t.output_shape(&shape))
    }

    /// Dtype of the final product; pure, touches no data.
    pub fn dtype(&self) -> DType {
        self.transforms
            .iter()
            .fold(self.source.dtype(), |dtype, t| t.output_dtype(dtype))
    }

    /// Materialise the product under a second-stage selection.
    ///
    /// `stage2` addresses the post-transform geometry reported by
    /// [`shape`](LazyIndexer::shape) and is applied after the transform
    /// chain, so transforms always see the full first-stage extent.
    pub fn get(&self, stage2: &Selection) -> StoreResult<ArrayData> {
        stage2.validate(&self.shape());
        let cover = self.stage1.covering_ranges(self.source.shape());
        let raw = self.source.read(&cover)?;
        let residual = Selection(
            self.stage1
                .axes()
                .iter()
                .zip(&cover)
                .map(|(sel, range)| match sel.to_indices() {
                    None => AxisSelection::Full,
                    Some(indices) => AxisSelection::Indices(
                        indices.into_iter().map(|i| i - range.start).collect(),
                    ),
                })
                .collect(),
        );
        let mut data = residual.apply(&raw);
        for transform in &self.transforms {
            data = transform.apply(data, stage2)?;
        }
        Ok(stage2.apply(&data))
    }

    /// Materialise the whole product.
    pub fn get_all(&self) -> StoreResult<ArrayData> {
        self.get(&Selection::full(self.shape().len()))
    }
}

impl fmt::Debug for LazyIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.transforms.iter().map(LazyTransform::name).collect();
        f.debug_struct("LazyIndexer")
            .field("shape", &self.shape())
            .field("dtype", &self.dtype())
            .field("transforms", &names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::lazy::transform::{scale, select_flag_bits};
    use ndarray::{ArrayD, IxDyn};
    use std::ops::Range;

    fn ramp(shape: &[usize]) -> ArrayData {
        let n: usize = shape.iter().product();
        ArrayData::F32(
            ArrayD::from_shape_vec(IxDyn(shape), (0..n).map(|i| i as f32).collect()).unwrap(),
        )
    }

    #[test]
    fn two_stage_selection_composes() {
        let data = ramp(&[6, 4]);
        let stage1 = Selection(vec![
            AxisSelection::Indices(vec![1, 3, 5]),
            AxisSelection::Full,
        ]);
        let indexer = LazyIndexer::new(Arc::new(data.clone()), stage1.clone());
        assert_eq!(indexer.shape(), vec![3, 4]);
        let stage2 = Selection(vec![
            AxisSelection::Indices(vec![2, 0]),
            AxisSelection::Mask(vec![true, false, false, true]),
        ]);
        let expected = stage2.apply(&stage1.apply(&data));
        assert_eq!(indexer.get(&stage2).unwrap(), expected);
    }

    #[test]
    fn residual_selection_is_rebased_onto_the_cover() {
        // Stage 1 skips the edges of the axis, so the covering read starts
        // at index 1 and the residual indices must shift accordingly.
        let data = ramp(&[5]);
        let indexer = LazyIndexer::new(
            Arc::new(data.clone()),
            Selection(vec![AxisSelection::Indices(vec![1, 3])]),
        );
        assert_eq!(
            indexer.get_all().unwrap(),
            data.select(0, &[1, 3])
        );
    }

    #[test]
    fn transforms_run_before_stage_two() {
        let flags = ArrayData::U8(
            ArrayD::from_shape_vec(IxDyn(&[4]), vec![0u8, 4, 8, 12]).unwrap(),
        );
        let indexer = LazyIndexer::over(Arc::new(flags)).with_transform(select_flag_bits(4));
        assert_eq!(indexer.dtype(), DType::Bool);
        let stage2 = Selection(vec![AxisSelection::Indices(vec![3, 1, 0])]);
        assert_eq!(
            indexer.get(&stage2).unwrap(),
            ArrayData::Bool(
                ArrayD::from_shape_vec(IxDyn(&[3]), vec![true, true, false]).unwrap()
            )
        );
    }

    #[test]
    fn chained_transforms_fold_in_order() {
        let indexer = LazyIndexer::over(Arc::new(ramp(&[3])))
            .with_transform(scale(2.0))
            .with_transform(scale(5.0));
        assert_eq!(
            indexer.get_all().unwrap(),
            ArrayData::F32(
                ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.0f32, 10.0, 20.0]).unwrap()
            )
        );
    }

    struct FailingSource {
        shape: Vec<usize>,
    }

    impl ArraySource for FailingSource {
        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn dtype(&self) -> DType {
            DType::F32
        }

        fn read(&self, _: &[Range<usize>]) -> StoreResult<ArrayData> {
            Err(StoreError::chunk_not_found("x/00000", "backend offline"))
        }
    }

    #[test]
    fn geometry_is_pure_even_when_reads_fail() {
        let indexer = LazyIndexer::over(Arc::new(FailingSource {
            shape: vec![8, 2],
        }))
        .with_transform(select_flag_bits(1));
        assert_eq!(indexer.shape(), vec![8, 2]);
        assert_eq!(indexer.dtype(), DType::Bool);
        assert!(indexer.get_all().unwrap_err().is_not_found());
    }
}
