//! Blocking rendezvous over asynchronous completions
//!
//! Platform services report completion through callbacks and broadcasts, while the
//! scanner, executor and interpreter are plain blocking code running on worker
//! threads. [`SyncBridge`] joins the two: a worker arms the bridge with
//! [`prepare`](SyncBridge::prepare), hands the returned handle to whatever callback
//! will fire, and blocks in [`wait`](SyncBridge::wait) until the callback calls
//! [`resume`](SyncBridge::resume).
//!
//! The bridge is a single-slot rendezvous and can be armed again after it fires.
//! Each arming starts a new generation; a handle from an earlier generation, such as
//! a callback that fired after its wait timed out, cannot release a later wait.
//!
//! ```
//! use audiobook_provisioner::sync_bridge::SyncBridge;
//! use std::time::Duration;
//!
//! let bridge = SyncBridge::new();
//! let callback = bridge.prepare();
//! std::thread::spawn(move || callback.resume());
//! assert!(bridge.wait(Duration::from_secs(5)));
//! ```

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct SlotState {
    armed: bool,
    signaled: bool,
    generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

/// Re-armable prepare / wait / resume primitive (cheap to clone, clones share the slot)
///
/// Handles returned by [`prepare`](Self::prepare) are tied to that arming. Other
/// clones resume whatever arming is current.
#[derive(Clone, Debug, Default)]
pub struct SyncBridge {
    slot: Arc<Slot>,
    generation: Option<u64>,
}

impl SyncBridge {
    /// Create a disarmed bridge
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the bridge, discarding any earlier signal
    ///
    /// Must be called before the asynchronous operation is started so that a
    /// completion arriving before [`wait`](Self::wait) is not lost. Returns the
    /// handle to give to that operation.
    pub fn prepare(&self) -> SyncBridge {
        let mut state = self.slot.state.lock();
        state.generation = state.generation.wrapping_add(1);
        state.armed = true;
        state.signaled = false;
        SyncBridge {
            slot: Arc::clone(&self.slot),
            generation: Some(state.generation),
        }
    }

    /// Block until [`resume`](Self::resume) is called or `timeout` expires
    ///
    /// Returns `true` when the completion arrived. Waiting on a bridge that was never
    /// prepared returns immediately with `false`. The bridge is disarmed on return
    /// either way.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock();
        if !state.armed {
            debug!("wait on a bridge that was never prepared");
            return false;
        }
        while !state.signaled {
            if self.slot.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        let fired = state.signaled;
        state.armed = false;
        state.signaled = false;
        if !fired {
            warn!(timeout_ms = timeout.as_millis(), "bridge wait timed out");
        }
        fired
    }

    /// Signal the waiting thread; called from the completion callback
    ///
    /// A resume without a preceding [`prepare`](Self::prepare) is ignored, as is one
    /// through a handle from an earlier arming.
    pub fn resume(&self) {
        let mut state = self.slot.state.lock();
        if let Some(generation) = self.generation
            && generation != state.generation
        {
            debug!(generation, current = state.generation, "ignoring stale completion");
            return;
        }
        if state.armed {
            state.signaled = true;
            self.slot.cond.notify_all();
        }
    }

    /// Whether the bridge is armed and not yet signaled
    pub fn is_pending(&self) -> bool {
        let state = self.slot.state.lock();
        state.armed && !state.signaled
    }
}
