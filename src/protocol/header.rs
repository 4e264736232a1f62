//! The main-header buffer format.
//!
//! The header is a small self-describing tree mirroring the shape of the
//! encoded value. Leaf nodes reference the out-of-band buffer that holds
//! their payload bytes; mapping keys and record/field names are embedded
//! directly in the header so that a container can be rebuilt without
//! touching the payload buffers. All integers are little-endian.

use crate::{
    malformed_err,
    protocol::{DType, Tag, Value},
    ShmqResult,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_bigint::BigInt;

/// Reference to one out-of-band buffer: its index in the descriptor's
/// `lengths[]` (0 is the header itself) and its byte length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct BufRef {
    pub(crate) index: u32,
    pub(crate) len: u64,
}

/// Name tag and field names of a record-flavored tuple.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct RecordShape {
    pub(crate) name: String,
    pub(crate) fields: Vec<String>,
}

/// One node of the header tree.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum HeaderNode {
    Absent,
    Int { signed: bool, buf: BufRef },
    Float { buf: BufRef },
    Bool { buf: BufRef },
    Bytes { buf: BufRef },
    Text { buf: BufRef },
    Array { dtype: DType, shape: Vec<u64>, buf: BufRef },
    DType { buf: BufRef },
    Tuple { record: Option<RecordShape>, children: Vec<HeaderNode> },
    Seq { children: Vec<HeaderNode> },
    Set { children: Vec<HeaderNode> },
    Map { entries: Vec<(Value, HeaderNode)> },
}

impl HeaderNode {
    pub(crate) fn emit(&self, w: &mut dyn std::io::Write) -> ShmqResult<()> {
        match self {
            Self::Absent => w.write_u8(Tag::Absent.type_code())?,
            Self::Int { signed, buf } => {
                w.write_u8(Tag::Int.type_code())?;
                w.write_u8(u8::from(*signed))?;
                emit_buf_ref(*buf, w)?;
            }
            Self::Float { buf } => {
                w.write_u8(Tag::Float.type_code())?;
                emit_buf_ref(*buf, w)?;
            }
            Self::Bool { buf } => {
                w.write_u8(Tag::Bool.type_code())?;
                emit_buf_ref(*buf, w)?;
            }
            Self::Bytes { buf } => {
                w.write_u8(Tag::Bytes.type_code())?;
                emit_buf_ref(*buf, w)?;
            }
            Self::Text { buf } => {
                w.write_u8(Tag::Text.type_code())?;
                emit_buf_ref(*buf, w)?;
            }
            Self::Array { dtype, shape, buf } => {
                w.write_u8(Tag::Array.type_code())?;
                w.write_u8(dtype.type_code())?;
                emit_shape(shape, w)?;
                emit_buf_ref(*buf, w)?;
            }
            Self::DType { buf } => {
                w.write_u8(Tag::DType.type_code())?;
                emit_buf_ref(*buf, w)?;
            }
            Self::Tuple { record, children } => {
                w.write_u8(Tag::Tuple.type_code())?;
                match record {
                    None => w.write_u8(0)?,
                    Some(shape) => {
                        w.write_u8(1)?;
                        emit_string(&shape.name, w)?;
                    }
                }
                emit_count(children.len(), w)?;
                if let Some(shape) = record {
                    for field in &shape.fields {
                        emit_string(field, w)?;
                    }
                }
                for child in children {
                    child.emit(w)?;
                }
            }
            Self::Seq { children } => {
                w.write_u8(Tag::Seq.type_code())?;
                emit_count(children.len(), w)?;
                for child in children {
                    child.emit(w)?;
                }
            }
            Self::Set { children } => {
                w.write_u8(Tag::Set.type_code())?;
                emit_count(children.len(), w)?;
                for child in children {
                    child.emit(w)?;
                }
            }
            Self::Map { entries } => {
                w.write_u8(Tag::Map.type_code())?;
                emit_count(entries.len(), w)?;
                for (key, child) in entries {
                    emit_inline_leaf(key, w)?;
                    child.emit(w)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn parse(rdr: &mut dyn std::io::Read) -> ShmqResult<Self> {
        let tag = Tag::try_new(rdr.read_u8()?)?;
        Ok(match tag {
            Tag::Absent => Self::Absent,
            Tag::Int => {
                let signed = parse_flag(rdr)?;
                Self::Int { signed, buf: parse_buf_ref(rdr)? }
            }
            Tag::Float => Self::Float { buf: parse_buf_ref(rdr)? },
            Tag::Bool => Self::Bool { buf: parse_buf_ref(rdr)? },
            Tag::Bytes => Self::Bytes { buf: parse_buf_ref(rdr)? },
            Tag::Text => Self::Text { buf: parse_buf_ref(rdr)? },
            Tag::Array => {
                let dtype = DType::try_new(rdr.read_u8()?)?;
                let shape = parse_shape(rdr)?;
                Self::Array { dtype, shape, buf: parse_buf_ref(rdr)? }
            }
            Tag::DType => Self::DType { buf: parse_buf_ref(rdr)? },
            Tag::Tuple => {
                let record_flag = parse_flag(rdr)?;
                let name = if record_flag { Some(parse_string(rdr)?) } else { None };
                let count = rdr.read_u32::<LittleEndian>()? as usize;
                let record = match name {
                    None => None,
                    Some(name) => {
                        let mut fields = Vec::new();
                        for _ in 0..count {
                            fields.push(parse_string(rdr)?);
                        }
                        Some(RecordShape { name, fields })
                    }
                };
                let mut children = Vec::new();
                for _ in 0..count {
                    children.push(Self::parse(rdr)?);
                }
                Self::Tuple { record, children }
            }
            Tag::Seq => Self::Seq { children: parse_children(rdr)? },
            Tag::Set => Self::Set { children: parse_children(rdr)? },
            Tag::Map => {
                let count = rdr.read_u32::<LittleEndian>()? as usize;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let key = parse_inline_leaf(rdr)?;
                    let child = Self::parse(rdr)?;
                    entries.push((key, child));
                }
                Self::Map { entries }
            }
        })
    }
}

fn parse_children(rdr: &mut dyn std::io::Read) -> ShmqResult<Vec<HeaderNode>> {
    let count = rdr.read_u32::<LittleEndian>()? as usize;
    let mut children = Vec::new();
    for _ in 0..count {
        children.push(HeaderNode::parse(rdr)?);
    }
    Ok(children)
}

fn emit_buf_ref(buf: BufRef, w: &mut dyn std::io::Write) -> ShmqResult<()> {
    w.write_u32::<LittleEndian>(buf.index)?;
    w.write_u64::<LittleEndian>(buf.len)?;
    Ok(())
}

fn parse_buf_ref(rdr: &mut dyn std::io::Read) -> ShmqResult<BufRef> {
    let index = rdr.read_u32::<LittleEndian>()?;
    let len = rdr.read_u64::<LittleEndian>()?;
    Ok(BufRef { index, len })
}

fn emit_count(count: usize, w: &mut dyn std::io::Write) -> ShmqResult<()> {
    let count = u32::try_from(count)
        .map_err(|_| crate::ShmqError::UnsupportedType("container has too many children"))?;
    w.write_u32::<LittleEndian>(count)?;
    Ok(())
}

fn emit_shape(shape: &[u64], w: &mut dyn std::io::Write) -> ShmqResult<()> {
    emit_count(shape.len(), w)?;
    for dim in shape {
        w.write_u64::<LittleEndian>(*dim)?;
    }
    Ok(())
}

fn parse_shape(rdr: &mut dyn std::io::Read) -> ShmqResult<Vec<u64>> {
    let ndim = rdr.read_u32::<LittleEndian>()? as usize;
    let mut shape = Vec::new();
    for _ in 0..ndim {
        shape.push(rdr.read_u64::<LittleEndian>()?);
    }
    Ok(shape)
}

fn emit_string(s: &str, w: &mut dyn std::io::Write) -> ShmqResult<()> {
    emit_count(s.len(), w)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn parse_string(rdr: &mut dyn std::io::Read) -> ShmqResult<String> {
    let bytes = parse_bytes_u32(rdr)?;
    String::from_utf8(bytes).map_err(|_| malformed_err!("header string is not valid UTF-8"))
}

fn parse_bytes_u32(rdr: &mut dyn std::io::Read) -> ShmqResult<Vec<u8>> {
    let len = rdr.read_u32::<LittleEndian>()? as usize;
    parse_bytes(len, rdr)
}

// Read n bytes, return as Vec<u8>
fn parse_bytes(len: usize, rdr: &mut dyn std::io::Read) -> ShmqResult<Vec<u8>> {
    let mut vec = vec![0_u8; len];
    rdr.read_exact(&mut vec)?;
    Ok(vec)
}

fn parse_flag(rdr: &mut dyn std::io::Read) -> ShmqResult<bool> {
    match rdr.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        f => Err(malformed_err!("invalid flag byte 0x{f:02x}")),
    }
}

/// Minimal two's-complement little-endian bytes of an integer, plus its
/// signedness. The result is never empty (zero encodes as one 0x00 byte).
pub(crate) fn int_to_le_bytes(i: &BigInt) -> (Vec<u8>, bool) {
    (i.to_signed_bytes_le(), i.sign() == num_bigint::Sign::Minus)
}

// Mapping keys ride inside the header with their payload bytes inline, so a
// mapping can be rebuilt in key order without touching the payload buffers.
// Only leaves can appear here; `encode` enforces that.
fn emit_inline_leaf(key: &Value, w: &mut dyn std::io::Write) -> ShmqResult<()> {
    match key {
        Value::Absent => w.write_u8(Tag::Absent.type_code())?,
        Value::Int(i) => {
            let (bytes, signed) = int_to_le_bytes(i);
            w.write_u8(Tag::Int.type_code())?;
            w.write_u8(u8::from(signed))?;
            emit_count(bytes.len(), w)?;
            w.write_all(&bytes)?;
        }
        Value::Float(f) => {
            w.write_u8(Tag::Float.type_code())?;
            w.write_f64::<LittleEndian>(*f)?;
        }
        Value::Bool(b) => {
            w.write_u8(Tag::Bool.type_code())?;
            w.write_u8(u8::from(*b))?;
        }
        Value::Bytes(b) => {
            w.write_u8(Tag::Bytes.type_code())?;
            emit_count(b.len(), w)?;
            w.write_all(b)?;
        }
        Value::Text(s) => {
            w.write_u8(Tag::Text.type_code())?;
            emit_string(s, w)?;
        }
        Value::Array(a) => {
            w.write_u8(Tag::Array.type_code())?;
            w.write_u8(a.dtype().type_code())?;
            let shape: Vec<u64> = a.shape().iter().map(|d| *d as u64).collect();
            emit_shape(&shape, w)?;
            emit_count(a.data().len(), w)?;
            w.write_all(a.data())?;
        }
        Value::DType(d) => {
            w.write_u8(Tag::DType.type_code())?;
            emit_string(d.as_str(), w)?;
        }
        _ => {
            return Err(crate::ShmqError::UnsupportedType(
                "mapping key is not a leaf value",
            ))
        }
    }
    Ok(())
}

fn parse_inline_leaf(rdr: &mut dyn std::io::Read) -> ShmqResult<Value> {
    let tag = Tag::try_new(rdr.read_u8()?)?;
    Ok(match tag {
        Tag::Absent => Value::Absent,
        Tag::Int => {
            let _signed = parse_flag(rdr)?;
            let bytes = parse_bytes_u32(rdr)?;
            if bytes.is_empty() {
                return Err(malformed_err!("integer key without payload bytes"));
            }
            Value::Int(BigInt::from_signed_bytes_le(&bytes))
        }
        Tag::Float => Value::Float(rdr.read_f64::<LittleEndian>()?),
        Tag::Bool => Value::Bool(parse_flag(rdr)?),
        Tag::Bytes => Value::Bytes(parse_bytes_u32(rdr)?),
        Tag::Text => Value::Text(parse_string(rdr)?),
        Tag::Array => {
            let dtype = DType::try_new(rdr.read_u8()?)?;
            let shape = parse_shape(rdr)?;
            let data = parse_bytes_u32(rdr)?;
            let shape = shape
                .into_iter()
                .map(usize::try_from)
                .collect::<Result<Vec<usize>, _>>()
                .map_err(|_| malformed_err!("array dimension exceeds the address space"))?;
            Value::Array(
                crate::NdArray::new(dtype, shape, data)
                    .map_err(|_| malformed_err!("array key contradicts its dtype and shape"))?,
            )
        }
        Tag::DType => Value::DType(
            DType::parse(&parse_string(rdr)?)
                .map_err(|_| malformed_err!("unknown element type in key"))?,
        ),
        t => return Err(malformed_err!("container tag {t:?} in key position")),
    })
}
