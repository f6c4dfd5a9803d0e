use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{BackendError, BridgeError, Thumbnail};

type Outcome = Result<Thumbnail, BridgeError>;

#[derive(Default)]
struct Slot {
    outcome: Option<Outcome>,
    closed: bool,
}

/// The request token shared by a blocked caller and its completion handler.
///
/// The slot accepts one outcome, and none once the caller stopped waiting.
pub struct PendingRequest {
    slot: Mutex<Slot>,
    cv: Condvar,
}

impl PendingRequest {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::default()),
            cv: Condvar::new(),
        })
    }

    pub fn complete(&self, outcome: Outcome) -> bool {
        let mut slot = self.slot.lock();
        if slot.closed || slot.outcome.is_some() {
            return false;
        }
        slot.outcome = Some(outcome);
        self.cv.notify_all();
        true
    }

    pub fn wait(&self, timeout: Duration) -> Outcome {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.outcome.is_none() {
            if self.cv.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.closed = true;
        slot.outcome
            .take()
            .unwrap_or(Err(BridgeError::Timeout(timeout)))
    }

    /// A handle that reports [`BackendError::Dropped`] unless it is completed
    /// before going away.
    pub fn completer(self: &Arc<Self>) -> Completer {
        Completer {
            pending: Some(Arc::clone(self)),
        }
    }
}

pub struct Completer {
    pending: Option<Arc<PendingRequest>>,
}

impl Completer {
    pub fn complete(mut self, outcome: Outcome) -> bool {
        self.pending
            .take()
            .map_or(false, |pending| pending.complete(outcome))
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.complete(Err(BridgeError::Backend(BackendError::Dropped)));
        }
    }
}
