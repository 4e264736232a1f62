use crate::{malformed_err, ShmqResult};

/// The small routing record placed on the data channel: segment name, total
/// byte count, and the sizes of the sub-buffers packed contiguously into the
/// segment (`lengths[0]` is the main header buffer).
///
/// This is the only thing that crosses the kernel boundary per message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    name: String,
    total_size: usize,
    lengths: Vec<usize>,
}

impl Descriptor {
    pub(crate) fn new(name: String, total_size: usize, lengths: Vec<usize>) -> Self {
        Self { name, total_size, lengths }
    }

    /// The segment's name in the host's shared-memory namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte length of the mapped region.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Sizes of the packed sub-buffers; they sum to `total_size`.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    // Applied by the receiver before mapping.
    pub(crate) fn validate(&self) -> ShmqResult<()> {
        if self.lengths.is_empty() {
            return Err(malformed_err!("descriptor carries no buffer lengths"));
        }
        if self.lengths.iter().sum::<usize>() != self.total_size {
            return Err(malformed_err!(
                "descriptor lengths sum to {} but declare a total of {}",
                self.lengths.iter().sum::<usize>(),
                self.total_size
            ));
        }
        Ok(())
    }
}
