//! First- and second-stage selections for lazy indexers.
//!
//! A selection has exactly one entry per axis: the full axis, an explicit
//! ordered index list, or a boolean mask. Selections never add or remove
//! axes; shape changes beyond per-axis lengths are the business of lazy
//! transforms.

use std::ops::Range;

use crate::data::ArrayData;

/// Selection along a single axis.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisSelection {
    /// Keep the whole axis.
    Full,
    /// Keep the listed indices, in the listed order.
    Indices(Vec<usize>),
    /// Keep the positions where the mask is true.
    Mask(Vec<bool>),
}

impl AxisSelection {
    /// Length of the axis after selection.
    pub fn output_len(&self, input_len: usize) -> usize {
        match self {
            AxisSelection::Full => input_len,
            AxisSelection::Indices(indices) => indices.len(),
            AxisSelection::Mask(mask) => mask.iter().filter(|&&keep| keep).count(),
        }
    }

    /// Explicit index list, or `None` for the full axis.
    pub fn to_indices(&self) -> Option<Vec<usize>> {
        match self {
            AxisSelection::Full => None,
            AxisSelection::Indices(indices) => Some(indices.clone()),
            AxisSelection::Mask(mask) => Some(
                mask.iter()
                    .enumerate()
                    .filter_map(|(i, &keep)| keep.then_some(i))
                    .collect(),
            ),
        }
    }

    /// Minimal contiguous span containing every selected index.
    pub fn covering_range(&self, input_len: usize) -> Range<usize> {
        match self {
            AxisSelection::Full => 0..input_len,
            AxisSelection::Indices(indices) => match (indices.iter().min(), indices.iter().max())
            {
                (Some(&lo), Some(&hi)) => lo..hi + 1,
                _ => 0..0,
            },
            AxisSelection::Mask(mask) => {
                let first = mask.iter().position(|&keep| keep);
                let last = mask.iter().rposition(|&keep| keep);
                match (first, last) {
                    (Some(lo), Some(hi)) => lo..hi + 1,
                    _ => 0..0,
                }
            }
        }
    }

    fn validate(&self, axis: usize, input_len: usize) {
        match self {
            AxisSelection::Full => {}
            AxisSelection::Indices(indices) => {
                for &i in indices {
                    assert!(
                        i < input_len,
                        "selection index {i} out of bounds for axis {axis} of length {input_len}"
                    );
                }
            }
            AxisSelection::Mask(mask) => {
                assert_eq!(
                    mask.len(),
                    input_len,
                    "selection mask length mismatch on axis {axis}"
                );
            }
        }
    }
}

/// A per-axis selection with exactly one entry per array dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection(pub Vec<AxisSelection>);

impl Selection {
    /// The identity selection on an `ndim`-dimensional array.
    pub fn full(ndim: usize) -> Selection {
        Selection(vec![AxisSelection::Full; ndim])
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn axes(&self) -> &[AxisSelection] {
        &self.0
    }

    /// Fail fast on rank mismatch, wrong mask length or out-of-bounds
    /// indices. Malformed selections are programming errors.
    pub fn validate(&self, shape: &[usize]) {
        assert_eq!(
            self.0.len(),
            shape.len(),
            "selection has {} axes but array has {}",
            self.0.len(),
            shape.len()
        );
        for (axis, (sel, &len)) in self.0.iter().zip(shape).enumerate() {
            sel.validate(axis, len);
        }
    }

    /// Shape after applying this selection; pure, touches no data.
    pub fn output_shape(&self, shape: &[usize]) -> Vec<usize> {
        self.validate(shape);
        self.0
            .iter()
            .zip(shape)
            .map(|(sel, &len)| sel.output_len(len))
            .collect()
    }

    /// Minimal covering range per axis.
    pub fn covering_ranges(&self, shape: &[usize]) -> Vec<Range<usize>> {
        self.0
            .iter()
            .zip(shape)
            .map(|(sel, &len)| sel.covering_range(len))
            .collect()
    }

    /// Apply the selection to an in-memory array. Must have been validated
    /// against the array's shape.
    pub fn apply(&self, data: &ArrayData) -> ArrayData {
        let mut out = data.clone();
        for (axis, sel) in self.0.iter().enumerate() {
            if let Some(indices) = sel.to_indices() {
                out = out.select(axis, &indices);
            }
        }
        out
    }
}
