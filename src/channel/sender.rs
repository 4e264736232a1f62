use crate::{
    channel::{
        config::ChannelConfiguration,
        control::{ControlRx, ControlTx},
    },
    cleanup, malformed_err,
    protocol::{self, Descriptor},
    segment::Segment,
    ShmqError, ShmqResult, Value,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, Once,
    },
    thread,
    time::{Duration, Instant},
};

/// The producing endpoint of a channel pair.
///
/// Every `put` writes the encoded value into a freshly allocated
/// shared-memory segment and publishes only a small [`Descriptor`] on the
/// data channel. A background drainer consumes acknowledgments and unlinks
/// the corresponding segments; a capacity bound, when configured, blocks
/// `put` until an acknowledgment frees a slot.
///
/// Dropping the sender closes it; `close` unlinks every segment that was
/// published but never acknowledged.
#[derive(Debug)]
pub struct Sender {
    core: Arc<SenderCore>,
}

impl Sender {
    pub(crate) fn new(
        config: &ChannelConfiguration,
        data_tx: ControlTx<Descriptor>,
        ack_rx: ControlRx<String>,
    ) -> Self {
        Self {
            core: Arc::new(SenderCore {
                capacity: config.capacity(),
                poll_quantum: config.poll_quantum(),
                data_tx: Mutex::new(Some(data_tx)),
                ack_rx: Mutex::new(Some(ack_rx)),
                gate: config.capacity().map(CapacityGate::new),
                open_handles: Mutex::new(HashMap::new()),
                all_acked: Condvar::new(),
                closed: AtomicBool::new(false),
                running: AtomicBool::new(true),
                init: Once::new(),
                drainer: Mutex::new(None),
            }),
        }
    }

    /// Publishes a value, waiting as long as necessary for a free slot when
    /// the channel is at capacity.
    pub fn put(&self, value: &Value) -> ShmqResult<()> {
        self.put_internal(value, true, None)
    }

    /// Publishes a value, waiting at most `timeout` for a free slot.
    /// Fails with `Timeout` on expiry, without side effects.
    pub fn put_timeout(&self, value: &Value, timeout: Duration) -> ShmqResult<()> {
        self.put_internal(value, true, Some(timeout))
    }

    /// Publishes a value without waiting. Fails with `Full` when the
    /// channel is at capacity.
    pub fn put_nowait(&self, value: &Value) -> ShmqResult<()> {
        self.put_internal(value, false, None)
    }

    fn put_internal(
        &self,
        value: &Value,
        block: bool,
        timeout: Option<Duration>,
    ) -> ShmqResult<()> {
        if self.core.is_closed() {
            return Err(ShmqError::BrokenChannel);
        }
        self.ensure_initialized();
        if self.core.is_closed() {
            return Err(ShmqError::BrokenChannel);
        }
        self.core.put(value, block, timeout)
    }

    /// Observational: true iff the capacity is unbounded or at least one
    /// slot is currently free. A later `put` may still block.
    pub fn has_space(&self) -> ShmqResult<bool> {
        if self.core.is_closed() {
            return Err(ShmqError::BrokenChannel);
        }
        match &self.core.gate {
            None => Ok(true),
            Some(gate) => Ok(*gate.permits.lock()? > 0),
        }
    }

    /// The configured capacity bound; `None` means unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.core.capacity
    }

    /// Blocks until every published segment has been acknowledged and
    /// unlinked. Fails with `BrokenChannel` if the sender is closed before
    /// or while waiting.
    pub fn wait_for_all_ack(&self) -> ShmqResult<()> {
        if self.core.is_closed() {
            return Err(ShmqError::BrokenChannel);
        }
        if !self.core.init.is_completed() {
            // nothing was ever published
            return Ok(());
        }
        let mut open_handles = self.core.open_handles.lock()?;
        while !open_handles.is_empty() {
            if self.core.is_closed() {
                return Err(ShmqError::BrokenChannel);
            }
            let (guard, _) = self
                .core
                .all_acked
                .wait_timeout(open_handles, self.core.poll_quantum)?;
            open_handles = guard;
        }
        Ok(())
    }

    /// Closes the sender: stops the ack drainer, unlinks every segment
    /// still awaiting acknowledgment, and drops the control-channel
    /// endpoints. Idempotent; errors during cleanup are swallowed.
    pub fn close(&self) {
        self.core.close();
    }

    /// Returns true if the sender is closed.
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    // Spawns the ack drainer on first use and registers the core for the
    // best-effort signal sweep.
    fn ensure_initialized(&self) {
        let core = &self.core;
        core.init.call_once(|| {
            let Ok(Some(ack_rx)) = core.ack_rx.lock().map(|mut slot| slot.take()) else {
                core.close();
                return;
            };
            let drain_core = Arc::clone(core);
            match thread::Builder::new()
                .name("shmq-ack-drainer".to_string())
                .spawn(move || drain_acks(&drain_core, &ack_rx))
            {
                Ok(handle) => {
                    if let Ok(mut slot) = core.drainer.lock() {
                        *slot = Some(handle);
                    }
                    debug!("ack drainer started");
                }
                Err(e) => {
                    error!("could not start the ack drainer: {e}");
                    core.close();
                }
            }
            cleanup::register(Arc::downgrade(core));
        });
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.core.close();
    }
}

#[derive(Debug)]
pub(crate) struct SenderCore {
    capacity: Option<usize>,
    poll_quantum: Duration,
    data_tx: Mutex<Option<ControlTx<Descriptor>>>,
    ack_rx: Mutex<Option<ControlRx<String>>>,
    gate: Option<CapacityGate>,
    // Segments published but not yet acknowledged. The lock is held only
    // across table mutations (and the unlink coupled to a removal), never
    // across channel I/O.
    open_handles: Mutex<HashMap<String, Segment>>,
    all_acked: Condvar,
    closed: AtomicBool,
    running: AtomicBool,
    init: Once,
    drainer: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SenderCore {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn put(&self, value: &Value, block: bool, timeout: Option<Duration>) -> ShmqResult<()> {
        if let Some(gate) = &self.gate {
            gate.acquire(block, timeout, &self.closed, self.poll_quantum)?;
        }
        match self.publish(value) {
            Ok(()) => Ok(()),
            Err(e) => {
                // A segment whose descriptor never reached the peer would
                // leak into the OS namespace; there is no safe
                // partial-failure state, so the channel goes down.
                if !self.is_closed() {
                    error!("put failed, closing the channel: {e}");
                    self.close();
                }
                Err(e)
            }
        }
    }

    fn publish(&self, value: &Value) -> ShmqResult<()> {
        let encoded = protocol::encode(value)?;
        let lengths = encoded.lengths();
        let total_size = encoded.total_size();

        let mut segment = Segment::create(total_size)?;
        let name = segment.name().to_string();
        if let Err(e) = write_segment(&mut segment, &encoded) {
            // never published, so this side must reclaim the name
            let _ = segment.unlink();
            return Err(e);
        }

        let descriptor = Descriptor::new(name.clone(), total_size, lengths);

        // The handle goes into the table before the descriptor is
        // published, so an ack can never name an unknown segment.
        match self.open_handles.lock() {
            Ok(mut open_handles) => {
                open_handles.insert(name.clone(), segment);
            }
            Err(_) => {
                let _ = segment.unlink();
                return Err(ShmqError::Poison);
            }
        }

        let send_result = match self.data_tx.lock()?.as_ref() {
            Some(data_tx) => data_tx.send(descriptor),
            None => Err(ShmqError::BrokenChannel),
        };
        if send_result.is_err() {
            // The descriptor never reached the peer. A concurrent close may
            // already have swept the handle; whoever still finds it unlinks.
            if let Ok(mut open_handles) = self.open_handles.lock() {
                if let Some(segment) = open_handles.remove(&name) {
                    let _ = segment.unlink();
                }
            }
            return send_result;
        }
        trace!("published segment {name} ({total_size} bytes)");
        Ok(())
    }

    // Called by the drainer for every received ack.
    fn complete_ack(&self, name: &str) -> ShmqResult<()> {
        let mut open_handles = self.open_handles.lock()?;
        let Some(segment) = open_handles.remove(name) else {
            return Err(malformed_err!("ack names unknown segment {name}"));
        };
        // Unlink and release the permit before the table lock goes: anyone
        // who observes the empty table must find the namespace clean and
        // the freed slot visible.
        segment.unlink()?;
        drop(segment);
        if let Some(gate) = &self.gate {
            gate.release()?;
        }
        let empty = open_handles.is_empty();
        drop(open_handles);

        if empty {
            self.all_acked.notify_all();
        }
        trace!("acked segment {name}");
        Ok(())
    }

    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("closing the sender");
        self.running.store(false, Ordering::Release);

        // wake anything blocked locally
        if let Some(gate) = &self.gate {
            gate.available.notify_all();
        }
        self.all_acked.notify_all();

        // Stop the drainer. When close originates inside the drainer
        // itself, joining would deadlock; the thread is about to exit
        // anyway.
        if let Ok(mut slot) = self.drainer.lock() {
            if let Some(handle) = slot.take() {
                if handle.thread().id() == thread::current().id() {
                    debug!("close invoked from the ack drainer, skipping join");
                } else if handle.join().is_err() {
                    debug!("ack drainer terminated with a panic");
                }
            }
        }

        // Best-effort sweep of everything still unacknowledged.
        if let Ok(mut open_handles) = self.open_handles.lock() {
            for (name, segment) in open_handles.drain() {
                if let Err(e) = segment.unlink() {
                    debug!("shutdown unlink of segment {name} failed: {e}");
                }
            }
        }

        // Drop the endpoints so the peer observes the disconnect.
        if let Ok(mut slot) = self.data_tx.lock() {
            slot.take();
        }
        if let Ok(mut slot) = self.ack_rx.lock() {
            slot.take();
        }
    }
}

fn write_segment(segment: &mut Segment, encoded: &protocol::EncodedValue<'_>) -> ShmqResult<()> {
    let mut offset = 0;
    segment.write(offset, &encoded.header)?;
    offset += encoded.header.len();
    for buffer in &encoded.buffers {
        segment.write(offset, buffer)?;
        offset += buffer.len();
    }
    Ok(())
}

fn drain_acks(core: &SenderCore, ack_rx: &ControlRx<String>) {
    while core.running.load(Ordering::Acquire) {
        match ack_rx.recv_quantum(core.poll_quantum) {
            Ok(Some(name)) => {
                if let Err(e) = core.complete_ack(&name) {
                    if !core.is_closed() {
                        error!("ack drainer failed: {e}");
                        core.close();
                    }
                    break;
                }
            }
            Ok(None) => {} // quantum elapsed, re-check the running flag
            Err(_) => {
                if !core.is_closed() {
                    debug!("ack channel disconnected, closing the sender");
                    core.close();
                }
                break;
            }
        }
    }
    debug!("ack drainer stopped");
}

// Counting gate limiting the number of simultaneously open handles.
#[derive(Debug)]
struct CapacityGate {
    permits: Mutex<usize>,
    available: Condvar,
}

impl CapacityGate {
    fn new(capacity: usize) -> Self {
        Self {
            permits: Mutex::new(capacity),
            available: Condvar::new(),
        }
    }

    // Takes one permit. Waits in poll-quantum steps so that a concurrent
    // close surfaces as `BrokenChannel` within one quantum.
    fn acquire(
        &self,
        block: bool,
        timeout: Option<Duration>,
        closed: &AtomicBool,
        quantum: Duration,
    ) -> ShmqResult<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut permits = self.permits.lock()?;
        loop {
            if closed.load(Ordering::Acquire) {
                return Err(ShmqError::BrokenChannel);
            }
            if *permits > 0 {
                *permits -= 1;
                return Ok(());
            }
            if !block {
                return Err(ShmqError::Full);
            }
            let wait = match deadline {
                None => quantum,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(ShmqError::Timeout);
                    }
                    quantum.min(remaining)
                }
            };
            let (guard, _) = self.available.wait_timeout(permits, wait)?;
            permits = guard;
        }
    }

    fn release(&self) -> ShmqResult<()> {
        let mut permits = self.permits.lock()?;
        *permits += 1;
        drop(permits);
        self.available.notify_one();
        Ok(())
    }
}
