//! A bounded, zero-copy message channel between two cooperating endpoints
//! on a single host, built on POSIX shared memory.
//!
//! The producer writes each message into a freshly allocated named
//! shared-memory segment and enqueues only a small [`Descriptor`] on a
//! control channel; the consumer maps the same segment, reconstructs the
//! message, and posts an acknowledgment telling the producer to release
//! the segment. Payload bytes never pass through the kernel's copy path.
//!
//! ```no_run
//! use shmq::{create_pair, ShmqResult, Value};
//!
//! # fn main() -> ShmqResult<()> {
//! let (sender, receiver) = create_pair(Some(2));
//!
//! sender.put(&Value::from("Hello World!"))?;
//! assert_eq!(receiver.get()?, Value::from("Hello World!"));
//!
//! sender.wait_for_all_ack()?;
//! # Ok(())
//! # }
//! ```
//!
//! The channel is point-to-point: one producer, one consumer. It is not a
//! broker, not durable, and not network-transparent. Values reach the
//! consumer in send order; acknowledgments are unordered. Unix only.

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

#[macro_use]
extern crate log;

mod channel;
mod cleanup;
mod protocol;
mod segment;
mod shmq_error;

pub use crate::channel::{
    create_pair, create_pair_with_configuration, ChannelConfiguration, Receiver, Sender,
};
pub use crate::protocol::{DType, Descriptor, NdArray, Value};
pub use crate::shmq_error::{ShmqError, ShmqResult};
