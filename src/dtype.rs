//! Element types supported by the chunk stores.

use std::fmt;

/// Element type of an [`crate::ArrayData`] and of every chunk in a store.
///
/// A chunk request must name the dtype it expects; a store rejects the
/// request with a dtype mismatch rather than casting silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    I32,
    F32,
    F64,
    /// Complex with f32 components, the native visibility element type.
    C64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::Bool | DType::U8 => 1,
            DType::I32 | DType::F32 => 4,
            DType::F64 | DType::C64 => 8,
        }
    }

    /// Stable one-byte identifier used by the chunk object codec.
    pub(crate) fn code(&self) -> u8 {
        match self {
            DType::Bool => 0,
            DType::U8 => 1,
            DType::I32 => 2,
            DType::F32 => 3,
            DType::F64 => 4,
            DType::C64 => 5,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<DType> {
        match code {
            0 => Some(DType::Bool),
            1 => Some(DType::U8),
            2 => Some(DType::I32),
            3 => Some(DType::F32),
            4 => Some(DType::F64),
            5 => Some(DType::C64),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::U8 => "uint8",
            DType::I32 => "int32",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::C64 => "complex64",
        };
        f.write_str(name)
    }
}
