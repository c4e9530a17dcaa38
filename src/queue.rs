use std::num::NonZeroUsize;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;

/// Producer side of the bounded FIFO between callers and the delivery worker.
///
/// Pushing never blocks. A full or closed queue just drops the line.
#[derive(Debug)]
pub(crate) struct SubmissionQueue {
    // None once closed. The write lock is only taken by `close`.
    tx: RwLock<Option<Sender<String>>>,
}

impl SubmissionQueue {
    pub(crate) fn bounded(capacity: NonZeroUsize) -> (Self, Receiver<String>) {
        let (tx, rx) = bounded(capacity.get());
        let queue = Self {
            tx: RwLock::new(Some(tx)),
        };
        (queue, rx)
    }

    pub(crate) fn try_push(&self, line: String) {
        if let Some(tx) = self.tx.read().as_ref() {
            // Full means we shed load, disconnected means the worker is gone.
            let _ = tx.try_send(line);
        }
    }

    /// Drops the sender so the worker sees the channel disconnect once it
    /// has taken everything already queued.
    pub(crate) fn close(&self) {
        self.tx.write().take();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }
}
