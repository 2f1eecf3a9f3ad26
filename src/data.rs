//! Dtype-tagged N-dimensional array values.
//!
//! [`ArrayData`] is the unit of data exchanged with a chunk store: a dense,
//! row-major N-d array whose element type is carried in the enum tag rather
//! than in a generic parameter, so that handles to arrays of different
//! dtypes can live behind one trait object.

use std::ops::Range;

use ndarray::{ArrayD, Axis, IxDyn, Slice};
use num_complex::Complex32;

use crate::dtype::DType;

/// Header prefix of the chunk object codec.
const CODEC_MAGIC: &[u8; 4] = b"VCHK";
const CODEC_VERSION: u8 = 1;

/// A dense N-dimensional array with its dtype in the tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(ArrayD<bool>),
    U8(ArrayD<u8>),
    I32(ArrayD<i32>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    C64(ArrayD<Complex32>),
}

/// Apply `$body` to the inner array, rewrapping the result in the same
/// variant.
macro_rules! map_data {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            ArrayData::Bool($arr) => ArrayData::Bool($body),
            ArrayData::U8($arr) => ArrayData::U8($body),
            ArrayData::I32($arr) => ArrayData::I32($body),
            ArrayData::F32($arr) => ArrayData::F32($body),
            ArrayData::F64($arr) => ArrayData::F64($body),
            ArrayData::C64($arr) => ArrayData::C64($body),
        }
    };
}

/// Apply `$body` to the inner array, returning its value directly.
macro_rules! with_data {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            ArrayData::Bool($arr) => $body,
            ArrayData::U8($arr) => $body,
            ArrayData::I32($arr) => $body,
            ArrayData::F32($arr) => $body,
            ArrayData::F64($arr) => $body,
            ArrayData::C64($arr) => $body,
        }
    };
}

impl ArrayData {
    /// An all-zero array of the given dtype and shape.
    pub fn zeros(dtype: DType, shape: &[usize]) -> ArrayData {
        let dim = IxDyn(shape);
        match dtype {
            DType::Bool => ArrayData::Bool(ArrayD::from_elem(dim, false)),
            DType::U8 => ArrayData::U8(ArrayD::from_elem(dim, 0)),
            DType::I32 => ArrayData::I32(ArrayD::from_elem(dim, 0)),
            DType::F32 => ArrayData::F32(ArrayD::from_elem(dim, 0.0)),
            DType::F64 => ArrayData::F64(ArrayD::from_elem(dim, 0.0)),
            DType::C64 => ArrayData::C64(ArrayD::from_elem(dim, Complex32::new(0.0, 0.0))),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::U8(_) => DType::U8,
            ArrayData::I32(_) => DType::I32,
            ArrayData::F32(_) => DType::F32,
            ArrayData::F64(_) => DType::F64,
            ArrayData::C64(_) => DType::C64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_data!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        with_data!(self, a => a.ndim())
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        with_data!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the sub-block covered by one unit-step range per dimension.
    ///
    /// The caller must supply exactly one in-bounds range per dimension;
    /// out-of-bounds ranges are a programming error.
    pub fn slice_ranges(&self, ranges: &[Range<usize>]) -> ArrayData {
        assert_eq!(
            ranges.len(),
            self.ndim(),
            "slice_ranges needs one range per dimension"
        );
        map_data!(self, a => a
            .slice_each_axis(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .to_owned())
    }

    /// Overwrite the sub-block covered by `ranges` with `src`.
    ///
    /// `src` must have the same dtype as `self` and exactly the shape of the
    /// target region; both are programming errors here and are validated by
    /// the store layer before any data is touched.
    pub fn assign_ranges(&mut self, ranges: &[Range<usize>], src: &ArrayData) {
        assert_eq!(
            ranges.len(),
            self.ndim(),
            "assign_ranges needs one range per dimension"
        );
        macro_rules! assign {
            ($dst:expr, $src:expr) => {{
                let mut view = $dst
                    .slice_each_axis_mut(|ax| Slice::from(ranges[ax.axis.index()].clone()));
                view.assign($src);
            }};
        }
        match (self, src) {
            (ArrayData::Bool(dst), ArrayData::Bool(src)) => assign!(dst, src),
            (ArrayData::U8(dst), ArrayData::U8(src)) => assign!(dst, src),
            (ArrayData::I32(dst), ArrayData::I32(src)) => assign!(dst, src),
            (ArrayData::F32(dst), ArrayData::F32(src)) => assign!(dst, src),
            (ArrayData::F64(dst), ArrayData::F64(src)) => assign!(dst, src),
            (ArrayData::C64(dst), ArrayData::C64(src)) => assign!(dst, src),
            (dst, src) => panic!(
                "assign_ranges dtype mismatch: {} vs {}",
                dst.dtype(),
                src.dtype()
            ),
        }
    }

    /// Fancy-index one axis with an explicit (possibly reordered) index list.
    pub fn select(&self, axis: usize, indices: &[usize]) -> ArrayData {
        map_data!(self, a => a.select(Axis(axis), indices))
    }

    /// Insert a singleton dimension at `pos`.
    pub fn insert_axis(self, pos: usize) -> ArrayData {
        map_data!(self, a => a.insert_axis(Axis(pos)))
    }

    /// Serialize into the chunk object format: a fixed header (magic,
    /// version, dtype code, rank, dims) followed by the elements in
    /// row-major order, little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        let shape = self.shape().to_vec();
        let mut out = Vec::with_capacity(7 + 8 * shape.len() + self.len() * self.dtype().size());
        out.extend_from_slice(CODEC_MAGIC);
        out.push(CODEC_VERSION);
        out.push(self.dtype().code());
        out.push(shape.len() as u8);
        for dim in &shape {
            out.extend_from_slice(&(*dim as u64).to_le_bytes());
        }
        match self {
            ArrayData::Bool(a) => {
                for v in a.iter() {
                    out.push(u8::from(*v));
                }
            }
            ArrayData::U8(a) => out.extend(a.iter().copied()),
            ArrayData::I32(a) => {
                for v in a.iter() {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            ArrayData::F32(a) => {
                for v in a.iter() {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            ArrayData::F64(a) => {
                for v in a.iter() {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            ArrayData::C64(a) => {
                for v in a.iter() {
                    out.extend_from_slice(&v.re.to_le_bytes());
                    out.extend_from_slice(&v.im.to_le_bytes());
                }
            }
        }
        out
    }

    /// Deserialize a chunk object; the error string describes the structural
    /// problem and is wrapped into a bad-chunk error by the store layer.
    pub fn from_bytes(buf: &[u8]) -> Result<ArrayData, String> {
        if buf.len() < 7 {
            return Err(format!("chunk object truncated at {} bytes", buf.len()));
        }
        if &buf[..4] != CODEC_MAGIC {
            return Err("chunk object has wrong magic".to_string());
        }
        if buf[4] != CODEC_VERSION {
            return Err(format!("unsupported chunk codec version {}", buf[4]));
        }
        let dtype = DType::from_code(buf[5])
            .ok_or_else(|| format!("unknown dtype code {}", buf[5]))?;
        let ndim = buf[6] as usize;
        let header_len = 7 + 8 * ndim;
        if buf.len() < header_len {
            return Err("chunk object truncated in dimension list".to_string());
        }
        let mut shape = Vec::with_capacity(ndim);
        for i in 0..ndim {
            let mut dim = [0u8; 8];
            dim.copy_from_slice(&buf[7 + 8 * i..15 + 8 * i]);
            shape.push(u64::from_le_bytes(dim) as usize);
        }
        let count: usize = shape.iter().product();
        let payload = &buf[header_len..];
        if payload.len() != count * dtype.size() {
            return Err(format!(
                "chunk payload is {} bytes, expected {} for {} x {}",
                payload.len(),
                count * dtype.size(),
                count,
                dtype
            ));
        }
        let dim = IxDyn(&shape);
        let data = match dtype {
            DType::Bool => {
                let v: Vec<bool> = payload.iter().map(|b| *b != 0).collect();
                ArrayData::Bool(ArrayD::from_shape_vec(dim, v).expect("shape matches payload"))
            }
            DType::U8 => ArrayData::U8(
                ArrayD::from_shape_vec(dim, payload.to_vec()).expect("shape matches payload"),
            ),
            DType::I32 => {
                let v: Vec<i32> = payload
                    .chunks_exact(4)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                ArrayData::I32(ArrayD::from_shape_vec(dim, v).expect("shape matches payload"))
            }
            DType::F32 => {
                let v: Vec<f32> = payload
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                ArrayData::F32(ArrayD::from_shape_vec(dim, v).expect("shape matches payload"))
            }
            DType::F64 => {
                let v: Vec<f64> = payload
                    .chunks_exact(8)
                    .map(|c| {
                        f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                    })
                    .collect();
                ArrayData::F64(ArrayD::from_shape_vec(dim, v).expect("shape matches payload"))
            }
            DType::C64 => {
                let v: Vec<Complex32> = payload
                    .chunks_exact(8)
                    .map(|c| {
                        Complex32::new(
                            f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                            f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                        )
                    })
                    .collect();
                ArrayData::C64(ArrayD::from_shape_vec(dim, v).expect("shape matches payload"))
            }
        };
        Ok(data)
    }

    /// Raise bits in a sub-block of a uint8 array, leaving other bits
    /// intact. Used to mark data-lost regions in flag arrays; a no-op for
    /// other dtypes.
    pub(crate) fn raise_u8_bits(&mut self, ranges: &[Range<usize>], bits: u8) {
        if let ArrayData::U8(a) = self {
            let mut view =
                a.slice_each_axis_mut(|ax| Slice::from(ranges[ax.axis.index()].clone()));
            view.mapv_inplace(|v| v | bits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_f32(shape: &[usize]) -> ArrayData {
        let n: usize = shape.iter().product();
        let v: Vec<f32> = (0..n).map(|i| i as f32).collect();
        ArrayData::F32(ArrayD::from_shape_vec(IxDyn(shape), v).unwrap())
    }

    #[test]
    fn slice_and_assign_round_trip() {
        let mut base = ArrayData::zeros(DType::F32, &[4, 3]);
        let block = ramp_f32(&[2, 2]);
        base.assign_ranges(&[1..3, 0..2], &block);
        assert_eq!(base.slice_ranges(&[1..3, 0..2]), block);
        // Untouched corner stays zero.
        assert_eq!(
            base.slice_ranges(&[0..1, 0..1]),
            ArrayData::zeros(DType::F32, &[1, 1])
        );
    }

    #[test]
    fn select_reorders_along_axis() {
        let data = ramp_f32(&[3, 2]);
        let picked = data.select(0, &[2, 0]);
        assert_eq!(picked.shape(), &[2, 2]);
        assert_eq!(picked.slice_ranges(&[0..1, 0..2]), data.slice_ranges(&[2..3, 0..2]));
    }

    #[test]
    fn codec_round_trip_all_dtypes() {
        let complex = ArrayData::C64(ArrayD::from_shape_vec(
            IxDyn(&[2, 2]),
            vec![
                Complex32::new(1.0, -1.0),
                Complex32::new(2.5, 0.0),
                Complex32::new(-3.0, 4.0),
                Complex32::new(0.0, 0.5),
            ],
        )
        .unwrap());
        let flags = ArrayData::U8(ArrayD::from_elem(IxDyn(&[3, 1]), 9u8));
        let mask = ArrayData::Bool(ArrayD::from_elem(IxDyn(&[5]), true));
        for data in [ramp_f32(&[2, 3, 4]), complex, flags, mask] {
            let bytes = data.to_bytes();
            assert_eq!(ArrayData::from_bytes(&bytes).unwrap(), data);
        }
    }

    #[test]
    fn codec_rejects_garbage() {
        assert!(ArrayData::from_bytes(b"nope").is_err());
        let mut bytes = ramp_f32(&[2, 2]).to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(ArrayData::from_bytes(&bytes).is_err());
    }

    #[test]
    fn raise_u8_bits_ors_into_block() {
        let mut flags = ArrayData::U8(
            ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1u8, 0, 0, 0]).unwrap(),
        );
        flags.raise_u8_bits(&[0..1, 0..2], 8);
        assert_eq!(
            flags,
            ArrayData::U8(
                ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![9u8, 8, 0, 0]).unwrap()
            )
        );
    }
}
