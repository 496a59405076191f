//! Cancellation and progress plumbing for a running join

use crate::join::attempt::JoinState;
use std::sync::Arc;
use tokio::sync::watch;

/// Requests cancellation of one attempt
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Checked by the driver at every state boundary
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Create a linked handle and signal
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Per-attempt controls handed to the driver
#[derive(Debug)]
pub struct AttemptControls {
    pub cancel: CancelSignal,
    /// Latest state of the running attempt, `None` when nothing runs
    pub progress: Arc<watch::Sender<Option<JoinState>>>,
}

impl AttemptControls {
    pub fn new(cancel: CancelSignal, progress: Arc<watch::Sender<Option<JoinState>>>) -> Self {
        Self { cancel, progress }
    }

    /// Controls nobody else observes; returns the cancel handle
    pub fn detached() -> (Self, CancelHandle) {
        let (handle, signal) = cancel_pair();
        let (progress, _) = watch::channel(None);
        (Self::new(signal, Arc::new(progress)), handle)
    }

    pub(crate) fn publish(&self, state: JoinState) {
        self.progress.send_replace(Some(state));
    }
}
