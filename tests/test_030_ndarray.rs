mod test_utils;

use log::info;
use shmq::{create_pair, DType, NdArray, ShmqResult, Value};

// cargo test test_030_ndarray -- --nocapture
#[test]
fn test_030_ndarray() -> ShmqResult<()> {
    let _log_handle = test_utils::init_logger();

    large_float_array()?;
    every_dtype()?;
    dtype_tags()
}

fn round_trip(value: &Value) -> ShmqResult<()> {
    let (sender, receiver) = create_pair(Some(1));
    sender.put(value)?;
    let item = receiver.get_timeout(test_utils::patience())?;
    assert_eq!(&item, value);
    sender.wait_for_all_ack()
}

fn large_float_array() -> ShmqResult<()> {
    info!("transport a multi-megabyte float32 tensor bit-identically");
    let shape = vec![4, 30, 6, 84, 84];
    let byte_len = shape.iter().product::<usize>() * DType::F32.size_of();
    let data = test_utils::pseudo_random_bytes(byte_len, 42);
    let array = NdArray::new(DType::F32, shape.clone(), data.clone()).unwrap();

    let (sender, receiver) = create_pair(Some(1));
    sender.put(&Value::Array(array))?;
    let Value::Array(received) = receiver.get_timeout(test_utils::patience())? else {
        panic!("array came back as something else");
    };
    assert_eq!(received.dtype(), DType::F32);
    assert_eq!(received.shape(), &shape[..]);
    assert_eq!(received.data(), &data[..]);
    sender.wait_for_all_ack()
}

fn every_dtype() -> ShmqResult<()> {
    info!("transport an array of every supported element type");
    for dtype in [
        DType::Bool,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::U8,
        DType::U16,
        DType::U32,
        DType::U64,
        DType::F32,
        DType::F64,
    ] {
        let shape = vec![3, 5];
        let data = vec![1_u8; 15 * dtype.size_of()];
        let array = NdArray::new(dtype, shape, data).unwrap();
        round_trip(&Value::Array(array))?;
    }

    // zero-element arrays are legal
    let empty = NdArray::new(DType::F64, vec![0, 4], vec![]).unwrap();
    round_trip(&Value::Array(empty))
}

fn dtype_tags() -> ShmqResult<()> {
    info!("transport element-type tags as standalone values");
    round_trip(&Value::from(DType::F32))?;
    round_trip(&Value::from(DType::U8))?;
    round_trip(&Value::Seq(vec![
        Value::from(DType::I64),
        Value::from(DType::Bool),
    ]))
}
