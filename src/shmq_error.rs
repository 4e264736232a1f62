use thiserror::Error;

/// A list specifying categories of [`ShmqError`](crate::ShmqError).
///
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ShmqError {
    /// Encoding saw a value that cannot be transported,
    /// e.g. a mapping key outside the leaf universe.
    #[error("Unsupported value: {}", _0)]
    UnsupportedType(&'static str),

    /// Decoding saw an unknown tag, inconsistent lengths, or otherwise
    /// corrupted segment contents.
    #[error("Malformed data: {}", _0)]
    MalformedData(String),

    /// A non-blocking `put` found the channel at capacity.
    #[error("Channel is at capacity")]
    Full,

    /// A non-blocking `get` found no message available.
    #[error("No message is available")]
    Empty,

    /// A timed blocking operation elapsed.
    #[error("Operation timed out")]
    Timeout,

    /// The local or peer endpoint is closed.
    #[error("Channel endpoint is closed")]
    BrokenChannel,

    /// The OS refused to create, map, or unlink a shared-memory segment.
    #[error("Shared-memory segment operation failed")]
    Segment {
        /// The causing Error.
        source: std::io::Error,
    },

    /// Error occurred while serializing or deserializing a segment header.
    #[error(transparent)]
    Io {
        /// The causing Error.
        #[from]
        source: std::io::Error,
    },

    /// Error occurred in thread synchronization.
    #[error("Error occurred in thread synchronization")]
    Poison,
}

/// Abbreviation of `Result<T, ShmqError>`.
pub type ShmqResult<T> = std::result::Result<T, ShmqError>;

impl ShmqError {
    /// Reveal the inner error, if any.
    pub fn inner(&self) -> Option<&dyn std::error::Error> {
        match self {
            Self::Segment { source } | Self::Io { source } => Some(source),
            _ => None,
        }
    }

    pub(crate) fn segment(source: std::io::Error) -> Self {
        Self::Segment { source }
    }
}

impl From<nix::errno::Errno> for ShmqError {
    fn from(errno: nix::errno::Errno) -> Self {
        Self::segment(std::io::Error::from(errno))
    }
}

impl<G> From<std::sync::PoisonError<G>> for ShmqError {
    fn from(_error: std::sync::PoisonError<G>) -> Self {
        Self::Poison
    }
}

/// Produces a `ShmqError::MalformedData` from a format string.
#[macro_export]
macro_rules! malformed_err {
    ($($arg:tt)*) => {
        $crate::ShmqError::MalformedData(format!($($arg)*))
    };
}
