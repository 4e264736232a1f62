mod test_utils;

use log::{debug, info};
use num_bigint::BigInt;
use shmq::{create_pair, ShmqResult, Value};

// cargo test test_010_round_trip -- --nocapture
#[test]
fn test_010_round_trip() -> ShmqResult<()> {
    let _log_handle = test_utils::init_logger();

    absent()?;
    integers()?;
    floats()?;
    booleans()?;
    byte_strings()?;
    text_strings()
}

fn round_trip(value: &Value) -> ShmqResult<()> {
    let (sender, receiver) = create_pair(Some(1));
    sender.put(value)?;
    let item = receiver.get_timeout(test_utils::patience())?;
    assert_eq!(&item, value, "expected {value:?}, got {item:?}");
    sender.wait_for_all_ack()
}

fn absent() -> ShmqResult<()> {
    info!("transport the absent value");
    round_trip(&Value::Absent)
}

fn integers() -> ShmqResult<()> {
    info!("transport integers of both signs and arbitrary size");
    round_trip(&Value::from(0))?;
    round_trip(&Value::from(37))?;
    round_trip(&Value::from(-37))?;
    round_trip(&Value::from(2_147_483_640_i64))?;
    round_trip(&Value::from(-2_147_483_640_i64))?;
    round_trip(&Value::from(u64::MAX))?;

    debug!("an integer that does not fit any machine word");
    let huge = BigInt::parse_bytes(b"123456789012345678901234567890123456789", 10).unwrap();
    round_trip(&Value::Int(-&huge))?;
    round_trip(&Value::Int(huge))
}

fn floats() -> ShmqResult<()> {
    info!("transport floats");
    round_trip(&Value::from(21_474.836_40))?;
    round_trip(&Value::from(-21_474.836_40))?;
    round_trip(&Value::from(0.0))?;
    round_trip(&Value::from(f64::MIN_POSITIVE))
}

fn booleans() -> ShmqResult<()> {
    info!("transport booleans");
    round_trip(&Value::from(true))?;
    round_trip(&Value::from(false))
}

fn byte_strings() -> ShmqResult<()> {
    info!("transport byte strings, including the empty one");
    round_trip(&Value::from(b"Hello World!".as_slice()))?;
    round_trip(&Value::from(b"".as_slice()))?;
    round_trip(&Value::Bytes(test_utils::pseudo_random_bytes(1 << 20, 7)))
}

fn text_strings() -> ShmqResult<()> {
    info!("transport text strings, including empty and non-ASCII ones");
    round_trip(&Value::from("Hello World!"))?;
    round_trip(&Value::from(""))?;
    round_trip(&Value::from("このコードは編集して実行出来ます！ 💩"))?;

    debug!("a long text");
    let long = "Zarathustra went down the mountain alone, no one meeting him. ".repeat(2_000);
    round_trip(&Value::from(long))
}
