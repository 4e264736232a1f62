//! The on-segment wire format: a value is laid out as a small
//! self-describing header buffer plus out-of-band payload buffers, packed
//! contiguously into one shared-memory segment.

mod decode;
mod descriptor;
mod dtype;
mod encode;
mod header;
mod tag;
mod value;

pub(crate) use self::decode::decode;
pub(crate) use self::encode::{encode, EncodedValue};
pub(crate) use self::tag::Tag;

pub use self::descriptor::Descriptor;
pub use self::dtype::DType;
pub use self::value::{NdArray, Value};
