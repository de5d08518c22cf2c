use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::shared::frame::Frame;

/// Bounded frame buffer that never blocks its producer.
///
/// When full, pushing evicts the oldest unread frame. The ring keeps its own
/// receiver handle, so the channel can never disconnect while the ring lives.
pub struct FrameRing {
    tx: Sender<Arc<Frame>>,
    rx: Receiver<Arc<Frame>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameRing {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity.get());
        Self {
            tx,
            rx,
            capacity: capacity.get(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Ring holding only the most recent frame.
    pub fn latest_only() -> Self {
        Self::new(NonZeroUsize::MIN)
    }

    /// Appends a frame, evicting the oldest unread ones if the ring is full.
    ///
    /// Returns how many frames were evicted.
    pub fn push(&self, frame: Arc<Frame>) -> usize {
        let mut pending = frame;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        evicted += 1;
                    }
                    pending = back;
                }
                // Unreachable while `self.rx` is alive.
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        if evicted > 0 {
            self.dropped.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    /// Oldest unread frame, waiting up to `timeout` for one to arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<Frame>> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Newest unread frame, discarding any older unread ones.
    ///
    /// Waits up to `timeout` when the ring is empty.
    pub fn wait_latest(&self, timeout: Duration) -> Option<Arc<Frame>> {
        let first = self.recv_timeout(timeout)?;
        Some(self.drain_after(first))
    }

    /// Newest unread frame without waiting.
    pub fn take_latest(&self) -> Option<Arc<Frame>> {
        let first = self.rx.try_recv().ok()?;
        Some(self.drain_after(first))
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted unread since construction.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn drain_after(&self, first: Arc<Frame>) -> Arc<Frame> {
        let mut latest = first;
        while let Ok(newer) = self.rx.try_recv() {
            latest = newer;
        }
        latest
    }
}
