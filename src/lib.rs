//! Lazy, chunked access to radio-telescope visibility data and instrument
//! telemetry.
//!
//! Correlator output is a large complex-valued array (time x frequency x
//! baseline) cut into rectangular chunks, each stored as one object in a
//! [`store::ChunkStore`] backend. The [`lazy`] layer defers indexing and
//! element-wise transforms over such arrays until data is actually
//! requested, and [`datasource::VisFlagsWeights`] wires the standard data
//! products (visibilities, flags, weights) of a capture block together.
//! Alongside the bulk data, [`sensor::SensorCache`] aligns irregular
//! instrument telemetry onto the correlator dump grid.

pub mod datasource;
pub mod lazy;
pub mod sensor;
pub mod store;

mod data;
mod dtype;
mod errors;
mod select;
mod source;

pub use data::ArrayData;
pub use dtype::DType;
pub use errors::{SensorError, SensorResult, StoreError, StoreResult};
pub use select::{AxisSelection, Selection};
pub use source::ArraySource;
