use crate::{
    channel::{
        config::ChannelConfiguration,
        control::{ControlRx, ControlTx},
    },
    protocol::{self, Descriptor},
    segment::Segment,
    ShmqError, ShmqResult, Value,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

/// The consuming endpoint of a channel pair.
///
/// `get` pulls the next [`Descriptor`] from the data channel, maps the
/// segment read-only, decodes the value, posts the acknowledgment that
/// authorizes the sender to unlink, and unmaps. The acknowledgment is sent
/// after the value has been fully copied out of the segment and before
/// `get` returns, so the segment can be reclaimed no matter how long the
/// caller holds the value.
///
/// Dropping the receiver closes it.
#[derive(Debug)]
pub struct Receiver {
    poll_quantum: Duration,
    data_rx: Mutex<Option<ControlRx<Descriptor>>>,
    ack_tx: Mutex<Option<ControlTx<String>>>,
    closed: AtomicBool,
}

impl Receiver {
    pub(crate) fn new(
        config: &ChannelConfiguration,
        data_rx: ControlRx<Descriptor>,
        ack_tx: ControlTx<String>,
    ) -> Self {
        Self {
            poll_quantum: config.poll_quantum(),
            data_rx: Mutex::new(Some(data_rx)),
            ack_tx: Mutex::new(Some(ack_tx)),
            closed: AtomicBool::new(false),
        }
    }

    /// Blocks until the next value arrives. A concurrent `close` on this
    /// receiver interrupts the wait within one poll quantum.
    pub fn get(&self) -> ShmqResult<Value> {
        self.get_internal(None)
    }

    /// Blocks until the next value arrives or `timeout` elapses; expiry
    /// fails with `Timeout`, without side effects.
    pub fn get_timeout(&self, timeout: Duration) -> ShmqResult<Value> {
        self.get_internal(Some(timeout))
    }

    /// Non-blocking variant; fails with `Empty` when no descriptor is
    /// immediately available.
    pub fn get_nowait(&self) -> ShmqResult<Value> {
        if self.is_closed() {
            return Err(ShmqError::BrokenChannel);
        }
        let received = {
            let slot = self.data_rx.lock()?;
            match slot.as_ref() {
                Some(data_rx) => data_rx.try_recv(),
                None => Err(ShmqError::BrokenChannel),
            }
        };
        match received {
            Ok(Some(descriptor)) => self.consume(&descriptor),
            Ok(None) => Err(ShmqError::Empty),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn get_internal(&self, timeout: Option<Duration>) -> ShmqResult<Value> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.is_closed() {
                return Err(ShmqError::BrokenChannel);
            }
            let wait = match deadline {
                None => self.poll_quantum,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(ShmqError::Timeout);
                    }
                    self.poll_quantum.min(remaining)
                }
            };
            let received = {
                let slot = self.data_rx.lock()?;
                match slot.as_ref() {
                    Some(data_rx) => data_rx.recv_quantum(wait),
                    None => Err(ShmqError::BrokenChannel),
                }
            };
            match received {
                Ok(Some(descriptor)) => return self.consume(&descriptor),
                Ok(None) => {} // quantum elapsed, re-check the closed flag
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
    }

    fn consume(&self, descriptor: &Descriptor) -> ShmqResult<Value> {
        match self.recover_value(descriptor) {
            Ok(value) => Ok(value),
            Err(e) => {
                // A descriptor whose segment could not be mapped or decoded
                // is never acked; the sender's shutdown sweep reclaims it.
                error!("receive failed, closing the channel: {e}");
                self.close();
                Err(e)
            }
        }
    }

    fn recover_value(&self, descriptor: &Descriptor) -> ShmqResult<Value> {
        descriptor.validate()?;
        let segment = Segment::open(descriptor.name(), descriptor.total_size())?;
        let value = protocol::decode(descriptor.lengths(), segment.as_slice())?;

        // The value owns its bytes now; authorize the sender to unlink. A
        // sender that is already gone has swept its segments itself, so an
        // authorization without addressee is not an error.
        {
            let slot = self.ack_tx.lock()?;
            match slot.as_ref() {
                Some(ack_tx) => {
                    if ack_tx.send(descriptor.name().to_string()).is_err() {
                        debug!("ack for segment {} has no addressee", descriptor.name());
                    }
                }
                None => return Err(ShmqError::BrokenChannel),
            }
        }
        drop(segment); // unmap
        trace!("received and acked segment {}", descriptor.name());
        Ok(value)
    }

    /// Closes the receiver and drops the control-channel endpoints.
    /// Idempotent; a blocked `get` on another thread observes the close
    /// within one poll quantum.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("closing the receiver");
        if let Ok(mut slot) = self.data_rx.lock() {
            slot.take();
        }
        if let Ok(mut slot) = self.ack_tx.lock() {
            slot.take();
        }
    }

    /// Returns true if the receiver is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.close();
    }
}
