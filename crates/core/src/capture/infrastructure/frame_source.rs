use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capture::domain::frame_device::{DeviceError, FrameDevice};
use crate::capture::domain::frame_receiver::FrameReceiver;
use crate::capture::infrastructure::frame_ring::FrameRing;
use crate::shared::cancellation::CancelToken;
use crate::shared::frame::Frame;
use crate::shared::log_sink::LogSink;

/// Owns the capture device and fans frames out to registered receivers.
///
/// Layout: `device → capture() → ring (bounded, drop-oldest) → receivers`
///
/// The ring is the buffer a consumer thread reads from; share it with
/// [`shared_ring`](Self::shared_ring). Receivers are called on the capture
/// thread with every frame.
///
/// `start_capturing` is meant to run on a dedicated thread; every other
/// method may be called from any thread while the loop runs.
pub struct FrameSource {
    device: Mutex<Box<dyn FrameDevice>>,
    description: String,
    ring: Arc<FrameRing>,
    receivers: Mutex<Vec<Arc<dyn FrameReceiver>>>,
    capturing: AtomicBool,
    stop_requested: AtomicBool,
    frames_captured: AtomicU64,
    cancel: CancelToken,
    log: Arc<dyn LogSink>,
}

impl FrameSource {
    pub fn new(device: Box<dyn FrameDevice>, capacity: NonZeroUsize, log: Arc<dyn LogSink>) -> Self {
        Self {
            description: device.describe(),
            device: Mutex::new(device),
            ring: Arc::new(FrameRing::new(capacity)),
            receivers: Mutex::new(Vec::new()),
            capturing: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            frames_captured: AtomicU64::new(0),
            cancel: CancelToken::new(),
            log,
        }
    }

    /// Blocks until the device yields a frame, buffers it and returns it.
    pub fn capture(&self) -> Result<Arc<Frame>, DeviceError> {
        let frame = {
            let mut device = self.device.lock().unwrap_or_else(|e| e.into_inner());
            device.grab(&self.cancel)?
        };
        let frame = Arc::new(frame);
        let evicted = self.ring.push(frame.clone());
        if evicted > 0 {
            log::trace!("Frame ring full, dropped {evicted} unread frame(s)");
        }
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        Ok(frame)
    }

    /// Capture loop: captures and fans out frames until stopped.
    ///
    /// Transient device errors are retried; any other device error is logged
    /// and ends the loop. Returns the error that ended the loop, if any.
    pub fn start_capturing(&self) -> Result<(), DeviceError> {
        if self.capturing.swap(true, Ordering::SeqCst) {
            log::warn!("Capture loop already running, ignoring second start");
            return Ok(());
        }
        let description = &self.description;
        log::info!("Capture loop started on {description}");

        let mut outcome = Ok(());
        while !self.should_stop() {
            match self.capture() {
                Ok(frame) => self.fan_out(frame),
                Err(DeviceError::Interrupted) => break,
                Err(e) if e.is_transient() => {
                    log::warn!("Capture from {description}: {e}");
                }
                Err(e) => {
                    log::error!("Capture from {description} failed: {e}");
                    self.log.log(&format!("Camera error, capture stopped: {e}"));
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.capturing.store(false, Ordering::SeqCst);
        log::info!(
            "Capture loop stopped after {} frames ({} dropped unread)",
            self.frames_captured(),
            self.ring.dropped_count()
        );
        outcome
    }

    /// Asks the capture loop to end after its current iteration.
    ///
    /// A stopped source stays stopped.
    pub fn stop_capturing(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Stops the loop and unblocks a device wait in progress.
    pub fn interrupt(&self) {
        self.stop_capturing();
        self.cancel.cancel();
    }

    pub fn add_frame_receiver(&self, receiver: Arc<dyn FrameReceiver>) {
        self.receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(receiver);
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Oldest buffered frame, waiting up to `timeout` for one.
    pub fn next_buffered(&self, timeout: Duration) -> Option<Arc<Frame>> {
        self.ring.recv_timeout(timeout)
    }

    /// Device description captured at construction.
    pub fn describe_device(&self) -> &str {
        &self.description
    }

    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    /// Handle to the ring for a consumer on another thread.
    pub fn shared_ring(&self) -> Arc<FrameRing> {
        self.ring.clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    /// Calls every receiver registered at the time of the call.
    ///
    /// The list is snapshotted first so receivers may register others (or
    /// the control thread may add receivers) without deadlocking.
    fn fan_out(&self, frame: Arc<Frame>) {
        let receivers: Vec<Arc<dyn FrameReceiver>> = self
            .receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for receiver in receivers {
            receiver.receive_frame(frame.clone());
        }
    }
}
