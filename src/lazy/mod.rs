//! Deferred indexing and element-wise transformation of array sources.
//!
//! A [`LazyIndexer`] pins a first-stage selection and a transform chain to
//! an [`crate::ArraySource`](crate::ArraySource) without touching any data;
//! shape and dtype of the final product are pure functions of the
//! composition. Data only moves on [`LazyIndexer::get`], which takes the
//! second-stage selection of the moment.

mod indexer;
mod transform;

pub use indexer::LazyIndexer;
pub use transform::{restore_singleton_dims, scale, select_flag_bits, LazyTransform};
