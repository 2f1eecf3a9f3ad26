//! Error taxonomy shared by the chunk stores and the sensor cache.
//!
//! Store failures collapse into two externally meaningful kinds:
//! - [`StoreError::ChunkNotFound`]: the backend has no data for the
//!   requested chunk identity.
//! - [`StoreError::BadChunk`]: the request or the returned data is
//!   structurally invalid (stride, bounds, shape or dtype mismatch).
//!
//! Backend-native failures are translated into these two kinds at the
//! backend boundary so that callers can decide whether a retry makes sense.

use snafu::prelude::*;

/// Error type for chunk store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("chunk {chunk} not found: {reason}"))]
    ChunkNotFound { chunk: String, reason: String },

    #[snafu(display("bad chunk {chunk}: {reason}"))]
    BadChunk { chunk: String, reason: String },

    #[snafu(display("failed to set up object store backend: {source}"))]
    StoreSetup { source: object_store::Error },

    #[snafu(display("failed to create tokio runtime for object store: {source}"))]
    CreateRuntime { source: std::io::Error },
}

impl StoreError {
    pub fn chunk_not_found(chunk: impl Into<String>, reason: impl Into<String>) -> StoreError {
        StoreError::ChunkNotFound {
            chunk: chunk.into(),
            reason: reason.into(),
        }
    }

    pub fn bad_chunk(chunk: impl Into<String>, reason: impl Into<String>) -> StoreError {
        StoreError::BadChunk {
            chunk: chunk.into(),
            reason: reason.into(),
        }
    }

    /// True if the chunk identity was absent in the backend (as opposed to
    /// the request or data being malformed).
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::ChunkNotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Error type for sensor cache lookups and extraction.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SensorError {
    #[snafu(display("sensor {name} not found in cache or virtual sensor registry"))]
    SensorLookupFailed { name: String },

    #[snafu(display("sensor {name} cannot be extracted: {reason}"))]
    SensorExtractFailed { name: String, reason: String },

    #[snafu(display("invalid virtual sensor pattern {pattern:?}: {source}"))]
    BadVirtualPattern { pattern: String, source: regex::Error },
}

impl SensorError {
    pub fn lookup_failed(name: impl Into<String>) -> SensorError {
        SensorError::SensorLookupFailed { name: name.into() }
    }

    pub fn extract_failed(name: impl Into<String>, reason: impl Into<String>) -> SensorError {
        SensorError::SensorExtractFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True if the name simply did not resolve, so a fallback candidate may
    /// still be tried.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, SensorError::SensorLookupFailed { .. })
    }
}

pub type SensorResult<T> = Result<T, SensorError>;
