use crate::{malformed_err, ShmqResult};

/// Element type of an [`NdArray`](crate::NdArray).
///
/// The set is enumerated explicitly; arbitrary element-type strings are not
/// passed through. Each variant has a stable one-byte wire code and a
/// canonical textual form.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DType {
    /// One byte per element, 0x00 or 0x01.
    Bool = 1,
    /// Signed 8-bit integer.
    I8 = 2,
    /// Signed 16-bit integer, little-endian.
    I16 = 3,
    /// Signed 32-bit integer, little-endian.
    I32 = 4,
    /// Signed 64-bit integer, little-endian.
    I64 = 5,
    /// Unsigned 8-bit integer.
    U8 = 6,
    /// Unsigned 16-bit integer, little-endian.
    U16 = 7,
    /// Unsigned 32-bit integer, little-endian.
    U32 = 8,
    /// Unsigned 64-bit integer, little-endian.
    U64 = 9,
    /// 32-bit IEEE-754 float, little-endian.
    F32 = 10,
    /// 64-bit IEEE-754 float, little-endian.
    F64 = 11,
}

impl DType {
    pub(crate) fn try_new(code: u8) -> ShmqResult<Self> {
        Ok(match code {
            1 => Self::Bool,
            2 => Self::I8,
            3 => Self::I16,
            4 => Self::I32,
            5 => Self::I64,
            6 => Self::U8,
            7 => Self::U16,
            8 => Self::U32,
            9 => Self::U64,
            10 => Self::F32,
            11 => Self::F64,
            c => return Err(malformed_err!("unknown element-type code {c}")),
        })
    }

    pub(crate) fn type_code(self) -> u8 {
        self as u8
    }

    /// Size of one element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// The canonical textual form, e.g. `"int32"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }

    /// Parses the canonical textual form.
    pub fn parse(s: &str) -> ShmqResult<Self> {
        Ok(match s {
            "bool" => Self::Bool,
            "int8" => Self::I8,
            "int16" => Self::I16,
            "int32" => Self::I32,
            "int64" => Self::I64,
            "uint8" => Self::U8,
            "uint16" => Self::U16,
            "uint32" => Self::U32,
            "uint64" => Self::U64,
            "float32" => Self::F32,
            "float64" => Self::F64,
            s => return Err(malformed_err!("unknown element type {s:?}")),
        })
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}
