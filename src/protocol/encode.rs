//! Lays a value out as a main header plus out-of-band payload buffers.

use crate::{
    protocol::{
        header::{int_to_le_bytes, BufRef, HeaderNode, RecordShape},
        Value,
    },
    ShmqError, ShmqResult,
};
use std::borrow::Cow;

/// The encoded form of one value: the serialized header tree (buffer 0) and
/// the ordered payload buffers it references. Large payloads (array bodies,
/// byte and text strings) are borrowed, not copied.
#[derive(Debug)]
pub(crate) struct EncodedValue<'a> {
    pub(crate) header: Vec<u8>,
    pub(crate) buffers: Vec<Cow<'a, [u8]>>,
}

impl EncodedValue<'_> {
    /// Total byte count: header plus all payload buffers.
    pub(crate) fn total_size(&self) -> usize {
        self.header.len() + self.buffers.iter().map(|b| b.len()).sum::<usize>()
    }

    /// The descriptor's `lengths[]`: header length first, then each payload
    /// buffer in declared order.
    pub(crate) fn lengths(&self) -> Vec<usize> {
        let mut lengths = Vec::with_capacity(1 + self.buffers.len());
        lengths.push(self.header.len());
        lengths.extend(self.buffers.iter().map(|b| b.len()));
        lengths
    }
}

/// Encodes a value. Fails with `UnsupportedType` on semantic violations of
/// the value universe (a mapping key outside the leaf universe).
pub(crate) fn encode(value: &Value) -> ShmqResult<EncodedValue<'_>> {
    let mut buffers = Vec::new();
    let node = lay_out(value, &mut buffers)?;
    let mut header = Vec::new();
    node.emit(&mut header)?;
    trace!(
        "encoded value into {} header bytes and {} payload buffers",
        header.len(),
        buffers.len()
    );
    Ok(EncodedValue { header, buffers })
}

// Buffer indices are assigned in depth-first encounter order; index 0 is the
// header itself, so the first payload buffer gets index 1.
fn push_buffer<'a>(buffers: &mut Vec<Cow<'a, [u8]>>, bytes: Cow<'a, [u8]>) -> BufRef {
    let len = bytes.len() as u64;
    buffers.push(bytes);
    BufRef { index: buffers.len() as u32, len }
}

fn lay_out<'a>(value: &'a Value, buffers: &mut Vec<Cow<'a, [u8]>>) -> ShmqResult<HeaderNode> {
    Ok(match value {
        Value::Absent => HeaderNode::Absent,
        Value::Int(i) => {
            let (bytes, signed) = int_to_le_bytes(i);
            HeaderNode::Int { signed, buf: push_buffer(buffers, Cow::Owned(bytes)) }
        }
        Value::Float(f) => HeaderNode::Float {
            buf: push_buffer(buffers, Cow::Owned(f.to_le_bytes().to_vec())),
        },
        Value::Bool(b) => HeaderNode::Bool {
            buf: push_buffer(buffers, Cow::Owned(vec![u8::from(*b)])),
        },
        Value::Bytes(b) => HeaderNode::Bytes { buf: push_buffer(buffers, Cow::Borrowed(b)) },
        Value::Text(s) => HeaderNode::Text {
            buf: push_buffer(buffers, Cow::Borrowed(s.as_bytes())),
        },
        Value::Array(a) => HeaderNode::Array {
            dtype: a.dtype(),
            shape: a.shape().iter().map(|d| *d as u64).collect(),
            buf: push_buffer(buffers, Cow::Borrowed(a.data())),
        },
        Value::DType(d) => HeaderNode::DType {
            buf: push_buffer(buffers, Cow::Borrowed(d.as_str().as_bytes())),
        },
        Value::Tuple(children) => HeaderNode::Tuple {
            record: None,
            children: lay_out_children(children, buffers)?,
        },
        Value::Seq(children) => HeaderNode::Seq {
            children: lay_out_children(children, buffers)?,
        },
        Value::Set(children) => HeaderNode::Set {
            children: lay_out_children(children, buffers)?,
        },
        Value::Map(entries) => {
            let mut laid_out = Vec::with_capacity(entries.len());
            for (key, child) in entries {
                if !key.is_leaf() {
                    return Err(ShmqError::UnsupportedType(
                        "mapping key is not a leaf value",
                    ));
                }
                laid_out.push((key.clone(), lay_out(child, buffers)?));
            }
            HeaderNode::Map { entries: laid_out }
        }
        Value::Record { name, fields } => {
            let shape = RecordShape {
                name: name.clone(),
                fields: fields.iter().map(|(f, _)| f.clone()).collect(),
            };
            let mut children = Vec::with_capacity(fields.len());
            for (_, child) in fields {
                children.push(lay_out(child, buffers)?);
            }
            HeaderNode::Tuple { record: Some(shape), children }
        }
    })
}

fn lay_out_children<'a>(
    children: &'a [Value],
    buffers: &mut Vec<Cow<'a, [u8]>>,
) -> ShmqResult<Vec<HeaderNode>> {
    children.iter().map(|child| lay_out(child, buffers)).collect()
}

#[cfg(test)]
mod tests {
    use super::encode;
    use crate::Value;

    #[test]
    fn absent_is_header_only() {
        let encoded = encode(&Value::Absent).unwrap();
        assert!(encoded.buffers.is_empty());
        assert_eq!(encoded.total_size(), encoded.header.len());
        assert_eq!(encoded.lengths(), vec![encoded.header.len()]);
    }

    #[test]
    fn payloads_ride_out_of_band() {
        let value = Value::Seq(vec![
            Value::from(b"abcdef".as_slice()),
            Value::from("ghi"),
        ]);
        let encoded = encode(&value).unwrap();
        assert_eq!(encoded.buffers.len(), 2);
        assert_eq!(&*encoded.buffers[0], b"abcdef");
        assert_eq!(&*encoded.buffers[1], b"ghi");
        assert_eq!(encoded.lengths()[1..], [6, 3]);
    }

    #[test]
    fn non_leaf_mapping_key_is_rejected() {
        let value = Value::Map(vec![(Value::Seq(vec![]), Value::Absent)]);
        assert!(encode(&value).is_err());
    }
}
