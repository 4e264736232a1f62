//! Rebuilds a value from a mapped segment.

use crate::{
    malformed_err,
    protocol::{
        header::{BufRef, HeaderNode},
        DType, NdArray, Value,
    },
    ShmqError, ShmqResult,
};
use num_bigint::BigInt;

/// Decodes the contents of one segment: `lengths` is the descriptor's
/// sub-buffer table (`lengths[0]` names the header), `data` the full mapped
/// region. Every structural inconsistency fails with `MalformedData`.
pub(crate) fn decode(lengths: &[usize], data: &[u8]) -> ShmqResult<Value> {
    if lengths.is_empty() {
        return Err(malformed_err!("descriptor carries no buffer lengths"));
    }
    if lengths.iter().sum::<usize>() != data.len() {
        return Err(malformed_err!(
            "buffer lengths sum to {} but the segment holds {} bytes",
            lengths.iter().sum::<usize>(),
            data.len()
        ));
    }

    // Cut the contiguously packed region back into its declared runs.
    let mut slices = Vec::with_capacity(lengths.len());
    let mut offset = 0;
    for len in lengths {
        slices.push(&data[offset..offset + len]);
        offset += len;
    }

    let mut rdr: &[u8] = slices[0];
    let node = HeaderNode::parse(&mut rdr).map_err(|e| match e {
        ShmqError::Io { .. } => malformed_err!("truncated header buffer"),
        e => e,
    })?;
    if !rdr.is_empty() {
        return Err(malformed_err!(
            "{} trailing bytes after the header tree",
            rdr.len()
        ));
    }
    rebuild(&node, &slices)
}

fn fetch<'a>(buf: BufRef, slices: &[&'a [u8]]) -> ShmqResult<&'a [u8]> {
    let index = buf.index as usize;
    if index == 0 || index >= slices.len() {
        return Err(malformed_err!("buffer index {index} is out of range"));
    }
    let bytes = slices[index];
    if bytes.len() as u64 != buf.len {
        return Err(malformed_err!(
            "buffer {index} holds {} bytes but the header declares {}",
            bytes.len(),
            buf.len
        ));
    }
    Ok(bytes)
}

fn rebuild(node: &HeaderNode, slices: &[&[u8]]) -> ShmqResult<Value> {
    Ok(match node {
        HeaderNode::Absent => Value::Absent,
        HeaderNode::Int { buf, .. } => {
            let bytes = fetch(*buf, slices)?;
            if bytes.is_empty() {
                return Err(malformed_err!("integer without payload bytes"));
            }
            Value::Int(BigInt::from_signed_bytes_le(bytes))
        }
        HeaderNode::Float { buf } => {
            let bytes = fetch(*buf, slices)?;
            let bytes: [u8; 8] = bytes
                .try_into()
                .map_err(|_| malformed_err!("float payload is not 8 bytes"))?;
            Value::Float(f64::from_le_bytes(bytes))
        }
        HeaderNode::Bool { buf } => match fetch(*buf, slices)? {
            [0x00] => Value::Bool(false),
            [0x01] => Value::Bool(true),
            _ => return Err(malformed_err!("invalid boolean payload")),
        },
        HeaderNode::Bytes { buf } => Value::Bytes(fetch(*buf, slices)?.to_vec()),
        HeaderNode::Text { buf } => Value::Text(
            String::from_utf8(fetch(*buf, slices)?.to_vec())
                .map_err(|_| malformed_err!("text payload is not valid UTF-8"))?,
        ),
        HeaderNode::Array { dtype, shape, buf } => {
            let bytes = fetch(*buf, slices)?;
            let shape = shape
                .iter()
                .map(|d| usize::try_from(*d))
                .collect::<Result<Vec<usize>, _>>()
                .map_err(|_| malformed_err!("array dimension exceeds the address space"))?;
            Value::Array(
                NdArray::new(*dtype, shape, bytes.to_vec())
                    .map_err(|_| malformed_err!("array payload contradicts dtype and shape"))?,
            )
        }
        HeaderNode::DType { buf } => {
            let text = String::from_utf8(fetch(*buf, slices)?.to_vec())
                .map_err(|_| malformed_err!("element-type payload is not valid UTF-8"))?;
            Value::DType(DType::parse(&text)?)
        }
        HeaderNode::Tuple { record: None, children } => {
            Value::Tuple(rebuild_children(children, slices)?)
        }
        HeaderNode::Tuple { record: Some(shape), children } => {
            if shape.fields.len() != children.len() {
                return Err(malformed_err!(
                    "record {:?} declares {} fields but carries {} values",
                    shape.name,
                    shape.fields.len(),
                    children.len()
                ));
            }
            let mut fields = Vec::with_capacity(children.len());
            for (field, child) in shape.fields.iter().zip(children) {
                fields.push((field.clone(), rebuild(child, slices)?));
            }
            Value::Record { name: shape.name.clone(), fields }
        }
        HeaderNode::Seq { children } => Value::Seq(rebuild_children(children, slices)?),
        HeaderNode::Set { children } => Value::Set(rebuild_children(children, slices)?),
        HeaderNode::Map { entries } => {
            // Values are rebuilt in key order, as the header carries them.
            let mut map = Vec::with_capacity(entries.len());
            for (key, child) in entries {
                map.push((key.clone(), rebuild(child, slices)?));
            }
            Value::Map(map)
        }
    })
}

fn rebuild_children(children: &[HeaderNode], slices: &[&[u8]]) -> ShmqResult<Vec<Value>> {
    children.iter().map(|child| rebuild(child, slices)).collect()
}

#[cfg(test)]
mod tests {
    use super::decode;
    use crate::{protocol::encode, DType, NdArray, ShmqError, Value};
    use num_bigint::BigInt;

    fn round_trip(value: &Value) -> Value {
        let encoded = encode(value).unwrap();
        let lengths = encoded.lengths();
        let mut data = encoded.header.clone();
        for buffer in &encoded.buffers {
            data.extend_from_slice(buffer);
        }
        decode(&lengths, &data).unwrap()
    }

    #[test]
    fn leaves_survive_the_round_trip() {
        for value in [
            Value::Absent,
            Value::from(37),
            Value::from(-37),
            Value::from(2_147_483_640_i64),
            Value::Int(BigInt::parse_bytes(b"-123456789012345678901234567890", 10).unwrap()),
            Value::from(21474.836_40),
            Value::from(true),
            Value::from(false),
            Value::from(b"Hello World!".as_slice()),
            Value::from(b"".as_slice()),
            Value::from("Hello World!"),
            Value::from(""),
            Value::from(DType::F32),
        ] {
            assert_eq!(value, round_trip(&value));
        }
    }

    #[test]
    fn containers_survive_the_round_trip() {
        let value = Value::Seq(vec![
            Value::from(1),
            Value::from("a"),
            Value::from(3.4),
            Value::from(5),
            Value::Absent,
            Value::from(b"Hello World!".as_slice()),
        ]);
        assert_eq!(value, round_trip(&value));

        let value = Value::Map(vec![
            (Value::from(1), Value::from("a")),
            (Value::from("b"), Value::from(2)),
            (Value::from(3), Value::from(4)),
        ]);
        assert_eq!(value, round_trip(&value));
    }

    #[test]
    fn record_keeps_its_name_and_field_order() {
        let value = Value::Record {
            name: "MyTuple".to_string(),
            fields: vec![
                ("a".to_string(), Value::from(1)),
                ("b".to_string(), Value::from(2.5)),
                ("c".to_string(), Value::from("three")),
            ],
        };
        assert_eq!(value, round_trip(&value));
    }

    #[test]
    fn array_keeps_dtype_shape_and_bytes() {
        let data: Vec<u8> = (0..48).collect();
        let value = Value::Array(NdArray::new(DType::F32, vec![3, 4], data).unwrap());
        assert_eq!(value, round_trip(&value));
    }

    #[test]
    fn inconsistent_lengths_are_rejected() {
        let value = Value::from("abc");
        let encoded = encode(&value).unwrap();
        let mut data = encoded.header.clone();
        for buffer in &encoded.buffers {
            data.extend_from_slice(buffer);
        }
        let mut lengths = encoded.lengths();
        lengths[1] += 1;
        assert!(matches!(
            decode(&lengths, &data),
            Err(ShmqError::MalformedData(_))
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            decode(&[1], &[0x7A]),
            Err(ShmqError::MalformedData(_))
        ));
    }
}
