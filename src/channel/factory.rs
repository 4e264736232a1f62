use crate::channel::{config::ChannelConfiguration, control, Receiver, Sender};

/// Constructs a matched sender/receiver pair with the given capacity bound;
/// `None` or `Some(0)` means unbounded.
///
/// One data FIFO (descriptors) and one ack FIFO (segment names) are created
/// and wired opposite-polarity into the two endpoints. Both endpoints are
/// `Send` and are handed to their owning thread at spawn time.
pub fn create_pair(capacity: Option<usize>) -> (Sender, Receiver) {
    create_pair_with_configuration(&ChannelConfiguration::default().with_capacity(capacity))
}

/// Constructs a matched sender/receiver pair from a full configuration.
pub fn create_pair_with_configuration(config: &ChannelConfiguration) -> (Sender, Receiver) {
    let (data_tx, data_rx) = control::fifo();
    let (ack_tx, ack_rx) = control::fifo();
    let sender = Sender::new(config, data_tx, ack_rx);
    let receiver = Receiver::new(config, data_rx, ack_tx);
    debug!("created channel pair (capacity: {:?})", config.capacity());
    (sender, receiver)
}
