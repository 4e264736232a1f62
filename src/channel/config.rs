use std::time::Duration;

/// Configuration of a channel pair.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ChannelConfiguration {
    capacity: Option<usize>,
    poll_quantum: Duration,
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            capacity: None,
            poll_quantum: Self::DEFAULT_POLL_QUANTUM,
        }
    }
}

impl ChannelConfiguration {
    /// Default value for the quantum in which blocking operations re-check
    /// the closed flag while waiting.
    ///
    /// The value can be changed with
    /// [`set_poll_quantum`](ChannelConfiguration::set_poll_quantum).
    pub const DEFAULT_POLL_QUANTUM: Duration = Duration::from_millis(100);

    /// Returns the capacity bound: the maximum number of published but
    /// not-yet-acknowledged messages. `None` means unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
    /// Sets the capacity bound; `None` or `Some(0)` disables it.
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity.filter(|c| *c > 0);
    }
    /// Builder-method for setting the capacity bound.
    #[must_use]
    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.set_capacity(capacity);
        self
    }

    /// Returns the poll quantum.
    pub fn poll_quantum(&self) -> Duration {
        self.poll_quantum
    }
    /// Sets the poll quantum. Very small quanta burn CPU, very large ones
    /// delay the reaction to `close`.
    pub fn set_poll_quantum(&mut self, quantum: Duration) {
        self.poll_quantum = quantum;
    }
    /// Builder-method for setting the poll quantum.
    #[must_use]
    pub fn with_poll_quantum(mut self, quantum: Duration) -> Self {
        self.set_poll_quantum(quantum);
        self
    }
}
