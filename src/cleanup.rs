//! Best-effort cleanup on SIGINT/SIGTERM.
//!
//! Scoped acquisition (`Drop` calls `close`) is the primary cleanup path.
//! This module adds a process-wide sweep for the case where the process is
//! terminated by a signal instead of unwinding: a listener thread closes
//! every registered sender, which unlinks all segments still awaiting
//! acknowledgment, and then re-raises the default action. Segments leaked
//! by `SIGKILL` are the OS's problem.

use crate::channel::SenderCore;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::{Mutex, Once, Weak};
use std::thread;

static REGISTRY: Mutex<Vec<Weak<SenderCore>>> = Mutex::new(Vec::new());
static LISTENER: Once = Once::new();

/// Registers a sender core for the signal sweep. Cores are held weakly, so
/// registration never extends a sender's lifetime.
pub(crate) fn register(core: Weak<SenderCore>) {
    LISTENER.call_once(spawn_listener);
    if let Ok(mut registry) = REGISTRY.lock() {
        registry.retain(|weak| weak.strong_count() > 0);
        registry.push(core);
    }
}

fn spawn_listener() {
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            // the host forbids signal handling; Drop remains the only sweep
            debug!("signal cleanup unavailable: {e}");
            return;
        }
    };
    let spawned = thread::Builder::new()
        .name("shmq-signal-cleanup".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                debug!("received signal {signal}, sweeping shared-memory segments");
                sweep();
                let _ = signal_hook::low_level::emulate_default_handler(signal);
            }
        });
    if let Err(e) = spawned {
        debug!("could not start the signal cleanup thread: {e}");
    }
}

fn sweep() {
    if let Ok(registry) = REGISTRY.lock() {
        for weak in registry.iter() {
            if let Some(core) = weak.upgrade() {
                core.close();
            }
        }
    }
}
