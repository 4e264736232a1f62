//! Control-channel endpoints.
//!
//! The channel core consumes two unidirectional process-safe FIFOs carrying
//! small values: descriptors one way, segment names the other. This module
//! is the seam where the FIFO primitive is chosen; a deployment that spans
//! OS processes would substitute an OS-backed queue behind these two
//! structs.

use crate::{ShmqError, ShmqResult};
use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// Creates one FIFO, returning its two ends.
pub(crate) fn fifo<T>() -> (ControlTx<T>, ControlRx<T>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ControlTx(tx), ControlRx(rx))
}

/// Producing end of a control FIFO.
#[derive(Debug)]
pub(crate) struct ControlTx<T>(crossbeam_channel::Sender<T>);

impl<T> ControlTx<T> {
    /// Enqueues without blocking; a disconnected peer is a broken channel.
    pub(crate) fn send(&self, msg: T) -> ShmqResult<()> {
        self.0.send(msg).map_err(|_| ShmqError::BrokenChannel)
    }
}

/// Consuming end of a control FIFO.
#[derive(Debug)]
pub(crate) struct ControlRx<T>(crossbeam_channel::Receiver<T>);

impl<T> ControlRx<T> {
    /// Waits up to one quantum. `Ok(None)` means the quantum elapsed and
    /// the caller should re-check its flags before waiting again.
    pub(crate) fn recv_quantum(&self, quantum: Duration) -> ShmqResult<Option<T>> {
        match self.0.recv_timeout(quantum) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ShmqError::BrokenChannel),
        }
    }

    /// Non-blocking receive; `Ok(None)` means the FIFO is currently empty.
    pub(crate) fn try_recv(&self) -> ShmqResult<Option<T>> {
        match self.0.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ShmqError::BrokenChannel),
        }
    }
}
