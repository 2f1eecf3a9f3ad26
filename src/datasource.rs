//! Correlator data products assembled from a chunk store.
//!
//! A capture block stores four arrays under a common base name:
//! `correlator_data` (complex64 visibilities, time x frequency x baseline),
//! `flags` (uint8 bitfields, same shape), `weights` (float32, same shape)
//! and `weights_channel` (float32, time x frequency). [`VisFlagsWeights`]
//! wires them into three lazy indexers, reducing flag bitfields to booleans
//! and folding the per-channel weights into the full-resolution weights.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use crate::data::ArrayData;
use crate::dtype::DType;
use crate::errors::{StoreError, StoreResult};
use crate::lazy::{select_flag_bits, LazyIndexer, LazyTransform};
use crate::select::Selection;
use crate::source::ArraySource;
use crate::store::{join, ChunkStore, ChunkedArrayHandle, FillPolicy};

/// Meaning of each bit in the flags bitfield, by bit position.
pub const FLAG_NAMES: [&str; 8] = [
    "reserved0",
    "static",
    "cam",
    "data_lost",
    "ingest_rfi",
    "predicted_rfi",
    "cal_rfi",
    "reserved7",
];

/// Flag bit raised on regions whose data never reached the store.
pub const DATA_LOST: u8 = 1 << 3;

/// Bitmask selecting the named flag types. Unknown names are logged and
/// skipped rather than failing the whole selection.
pub fn flag_mask(names: &[&str]) -> u8 {
    let mut mask = 0u8;
    for name in names {
        match FLAG_NAMES.iter().position(|n| n == name) {
            Some(bit) => mask |= 1 << bit,
            None => log::warn!(
                "skipping unknown flag type {name:?}, supported ones are {FLAG_NAMES:?}"
            ),
        }
    }
    mask
}

/// Storage layout of one array: dtype, full shape and chunk sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLayout {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
}

/// Visibilities, flags and weights of one capture block, each behind a
/// lazy indexer sharing a chunk store.
#[derive(Debug)]
pub struct VisFlagsWeights {
    vis: LazyIndexer,
    flags: LazyIndexer,
    weights: LazyIndexer,
    name: String,
}

impl VisFlagsWeights {
    /// Wire up the data products of the capture block at `base_name`.
    ///
    /// `stage1` restricts all three products along time, frequency and
    /// baseline; the per-channel weights get its time and frequency axes.
    /// `flag_mask` picks the flag types that count as flagged in the
    /// boolean flags product. With `zero_fill` set, chunks missing from the
    /// store read as zeros instead of failing, and any region whose chunks
    /// are lost from any of the four arrays raises the [`DATA_LOST`] bit in
    /// the flags product. A missing `weights_channel` layout degrades to
    /// unit channel weights.
    pub fn from_store(
        store: Arc<dyn ChunkStore>,
        base_name: &str,
        layouts: &HashMap<String, ChunkLayout>,
        stage1: Selection,
        flag_mask: u8,
        zero_fill: bool,
    ) -> StoreResult<VisFlagsWeights> {
        let handle = |array: &str| -> StoreResult<ChunkedArrayHandle> {
            let layout = layouts.get(array).ok_or_else(|| {
                StoreError::chunk_not_found(
                    join(&[base_name, array]),
                    format!("array {array:?} missing from chunk layout"),
                )
            })?;
            Ok(ChunkedArrayHandle::new(
                Arc::clone(&store),
                join(&[base_name, array]),
                layout.shape.clone(),
                layout.chunks.clone(),
                layout.dtype,
            ))
        };
        let fill = |flag_bit| {
            if zero_fill {
                FillPolicy::ZeroFill { flag_bit }
            } else {
                FillPolicy::Error
            }
        };

        let vis = handle("correlator_data")?.with_fill(fill(None));
        let flags = handle("flags")?.with_fill(fill(Some(DATA_LOST)));
        let weights = handle("weights")?.with_fill(fill(None));
        if vis.shape() != flags.shape() || vis.shape() != weights.shape() {
            return Err(StoreError::bad_chunk(
                base_name,
                format!(
                    "shapes of correlator_data {:?}, flags {:?} and weights {:?} differ",
                    vis.shape(),
                    flags.shape(),
                    weights.shape()
                ),
            ));
        }

        let channel = match handle("weights_channel") {
            Ok(channel) => Some(channel.with_fill(fill(None))),
            Err(_) => {
                log::warn!(
                    "capture block {base_name}: no weights_channel array, \
                     assuming unit channel weights"
                );
                None
            }
        };

        let flags_source: Arc<dyn ArraySource> = if zero_fill {
            let mut peers = vec![vis.clone(), weights.clone()];
            peers.extend(channel.clone());
            Arc::new(LossMarkedFlags { flags, peers })
        } else {
            Arc::new(flags)
        };
        let flags = LazyIndexer::new(flags_source, stage1.clone())
            .with_transform(select_flag_bits(flag_mask));
        let weights = LazyIndexer::new(Arc::new(weights), stage1.clone());
        let weights = match channel {
            Some(channel) => {
                // The channel weights share the time and frequency axes of
                // the full-resolution products.
                let channel_stage1 = Selection(stage1.axes()[..2].to_vec());
                let channel = LazyIndexer::new(Arc::new(channel), channel_stage1);
                weights.with_transform(apply_channel_weights(channel))
            }
            None => weights,
        };
        Ok(VisFlagsWeights {
            vis: LazyIndexer::new(Arc::new(vis), stage1),
            flags,
            weights,
            name: base_name.to_string(),
        })
    }

    /// Complex visibilities, time x frequency x baseline.
    pub fn vis(&self) -> &LazyIndexer {
        &self.vis
    }

    /// Boolean flags: true where any selected flag type is raised.
    pub fn flags(&self) -> &LazyIndexer {
        &self.flags
    }

    /// Effective weights: stored weights scaled by the per-channel weights.
    pub fn weights(&self) -> &LazyIndexer {
        &self.weights
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Vec<usize> {
        self.vis.shape()
    }
}

/// Flags source that also raises [`DATA_LOST`] over regions whose chunks
/// are missing from a peer array, matching the zeros substituted on the
/// peer's own read path.
struct LossMarkedFlags {
    flags: ChunkedArrayHandle,
    peers: Vec<ChunkedArrayHandle>,
}

impl ArraySource for LossMarkedFlags {
    fn shape(&self) -> &[usize] {
        self.flags.shape()
    }

    fn dtype(&self) -> DType {
        DType::U8
    }

    fn read(&self, ranges: &[Range<usize>]) -> StoreResult<ArrayData> {
        let mut out = self.flags.read(ranges)?;
        for peer in &self.peers {
            // A peer covering only the leading axes (weights_channel)
            // loses data across all of the trailing axes.
            let ndim = peer.shape().len();
            let peer_ranges = &ranges[..ndim];
            for extent in peer.missing_chunks(peer_ranges)? {
                let mut dst: Vec<Range<usize>> = extent
                    .iter()
                    .zip(peer_ranges)
                    .map(|(e, r)| e.start.max(r.start) - r.start..e.end.min(r.end) - r.start)
                    .collect();
                for r in &ranges[ndim..] {
                    dst.push(0..r.end - r.start);
                }
                out.raise_u8_bits(&dst, DATA_LOST);
            }
        }
        Ok(out)
    }
}

/// Multiply full-resolution weights by the per-channel weights, broadcast
/// over the baseline axis.
fn apply_channel_weights(channel: LazyIndexer) -> LazyTransform {
    LazyTransform::new("apply_channel_weights", move |data, _| {
        let factor = channel.get_all()?.insert_axis(2);
        match (data, factor) {
            (ArrayData::F32(weights), ArrayData::F32(factor)) => {
                Ok(ArrayData::F32(weights * &factor))
            }
            (data, factor) => Err(StoreError::bad_chunk(
                "<transform>",
                format!(
                    "channel weights need float32 inputs, got {} and {}",
                    data.dtype(),
                    factor.dtype()
                ),
            )),
        }
    })
}
