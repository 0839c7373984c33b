//! Output Guard
//!
//! Serialized outbound frame queue for a single connection. Producers push
//! whole frames; the connection's writer loop drains them one at a time, so
//! concurrent senders can never interleave partial writes. Closing the guard
//! wakes every blocked waiter, which is what keeps a writer blocked on
//! output availability from hanging forever after `kill`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::Notify;

/// Outbound frame queue with wake-on-close semantics
#[derive(Debug, Default)]
pub struct OutputGuard {
    queue: Mutex<VecDeque<Bytes>>,
    ready: Notify,
    closed: AtomicBool,
}

impl OutputGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one frame for the writer loop. Returns false if the guard has
    /// been closed, in which case the frame is dropped.
    pub fn push(&self, frame: Bytes) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.queue
            .lock()
            .expect("output queue lock poisoned")
            .push_back(frame);
        self.ready.notify_one();
        true
    }

    /// Wait for the next frame. Returns `None` once the guard is closed and
    /// drained; frames queued before close are still delivered.
    pub async fn next(&self) -> Option<Bytes> {
        loop {
            // Register for notification before checking state so a close or
            // push between the check and the await cannot be missed.
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self
                .queue
                .lock()
                .expect("output queue lock poisoned")
                .pop_front()
            {
                return Some(frame);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            notified.await;
        }
    }

    /// Close the guard and wake all waiters
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of frames waiting to be written
    pub fn pending(&self) -> usize {
        self.queue.lock().expect("output queue lock poisoned").len()
    }
}
