use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::capture::domain::frame_device::{DeviceError, FrameDevice};
use crate::capture::infrastructure::frame_source::FrameSource;
use crate::config::{ConfigError, ReceptionistConfig};
use crate::detection::domain::cascade::{CascadeLoader, ConfigurationError};
use crate::detection::domain::controller::{ControllerId, DetectionController};
use crate::detection::domain::detection_result::{DetectionSnapshot, SnapshotProvider};
use crate::detection::infrastructure::feature_detector::{DetectorError, FeatureDetector};
use crate::pipeline::infrastructure::worker::{Worker, WorkerError};
use crate::shared::log_sink::LogSink;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("pipeline is already running")]
    AlreadyStarted,
    #[error("pipeline has been stopped")]
    Stopped,
}

struct Workers {
    capture: Worker<Result<(), DeviceError>>,
    detection: Worker<Result<(), DetectorError>>,
}

/// Runs capture and detection on two worker threads and owns their lifecycle.
///
/// Layout: `device → FrameSource ring → FeatureDetector → controllers`
///
/// The detector consumes the source's bounded ring directly, so the ring
/// capacity is the only buffer between the two threads.
///
/// A controller is single-use: once stopped it cannot be restarted.
pub struct PipelineController {
    source: Arc<FrameSource>,
    detector: Arc<FeatureDetector>,
    log: Arc<dyn LogSink>,
    shutdown_timeout: Duration,
    workers: Mutex<Option<Workers>>,
    ui_controllers: Mutex<Vec<ControllerId>>,
    stopped: AtomicBool,
}

impl PipelineController {
    /// Points `detector` at the capture ring of `source`.
    pub fn new(
        source: FrameSource,
        detector: FeatureDetector,
        log: Arc<dyn LogSink>,
        shutdown_timeout: Duration,
    ) -> Self {
        let detector = detector.with_inbox(source.shared_ring());
        Self {
            source: Arc::new(source),
            detector: Arc::new(detector),
            log,
            shutdown_timeout,
            workers: Mutex::new(None),
            ui_controllers: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Builds source and detector from configuration. Every configured
    /// cascade must load, or construction fails.
    pub fn from_config(
        config: &ReceptionistConfig,
        device: Box<dyn FrameDevice>,
        loader: Arc<dyn CascadeLoader>,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.frame_capacity).ok_or_else(|| {
            ConfigurationError::Invalid("frame capacity must be at least 1".to_string())
        })?;

        let detector = FeatureDetector::new(
            loader,
            &config.cascades.face,
            config.detection,
            log.clone(),
        )?
        .with_poll_interval(Duration::from_millis(config.poll_interval_ms));
        for (kind, path) in config.cascades.sub_features() {
            detector.load_cascade(kind, path)?;
        }

        let source = FrameSource::new(device, capacity, log.clone());
        Ok(Self::new(
            source,
            detector,
            log,
            Duration::from_millis(config.shutdown_timeout_ms),
        ))
    }

    /// Spawns the capture and detection threads.
    pub fn start(&self) -> Result<(), PipelineError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(PipelineError::Stopped);
        }
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if workers.is_some() {
            return Err(PipelineError::AlreadyStarted);
        }

        let detection = {
            let detector = self.detector.clone();
            Worker::spawn("receptionist-detection", move || detector.thread_start())?
        };
        let capture = {
            let source = self.source.clone();
            Worker::spawn("receptionist-capture", move || source.start_capturing())
        };
        let capture = match capture {
            Ok(worker) => worker,
            Err(e) => {
                self.detector.interrupt();
                let _ = detection.join_within(self.shutdown_timeout);
                return Err(e.into());
            }
        };

        *workers = Some(Workers { capture, detection });
        log::info!("Pipeline started on {}", self.source.describe_device());
        self.log.log("Ready...");
        Ok(())
    }

    /// True while both worker loops are alive. A loop that ended on its own
    /// (device failure, cascade failure) makes this false before `stop`.
    pub fn is_running(&self) -> bool {
        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|w| !w.capture.is_finished() && !w.detection.is_finished())
    }

    /// Registers a controller for the lifetime of the pipeline; it is
    /// deregistered by [`stop`](Self::stop).
    pub fn add_ui_controller(&self, controller: Arc<dyn DetectionController>) -> ControllerId {
        let id = self.detector.add_controller(controller);
        self.ui_controllers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(id);
        id
    }

    pub fn remove_ui_controller(&self, id: ControllerId) -> bool {
        self.ui_controllers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|c| *c != id);
        self.detector.remove_controller(id)
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn detector(&self) -> &FeatureDetector {
        &self.detector
    }

    /// Shuts both workers down within the shutdown timeout. Idempotent.
    ///
    /// Returns the first failure to join; errors that ended a worker loop
    /// were already logged by that loop.
    pub fn stop(&self) -> Result<(), PipelineError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let deadline = Instant::now() + self.shutdown_timeout;

        self.source.stop_capturing();
        self.detector.request_thread_stop();

        let ids: Vec<ControllerId> = self
            .ui_controllers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for id in ids {
            self.detector.remove_controller(id);
        }

        self.source.interrupt();
        self.detector.interrupt();

        let workers = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(Workers { capture, detection }) = workers else {
            return Ok(());
        };

        let mut first_error: Option<PipelineError> = None;
        fn set_if_none(slot: &mut Option<PipelineError>, err: PipelineError) {
            if slot.is_none() {
                *slot = Some(err);
            }
        }

        match capture.join_until(deadline, self.shutdown_timeout) {
            Ok(Err(e)) => log::debug!("Capture loop had ended with: {e}"),
            Ok(Ok(())) => {}
            Err(e) => set_if_none(&mut first_error, e.into()),
        }
        match detection.join_until(deadline, self.shutdown_timeout) {
            Ok(Err(e)) => log::debug!("Detection loop had ended with: {e}"),
            Ok(Ok(())) => {}
            Err(e) => set_if_none(&mut first_error, e.into()),
        }

        log::info!(
            "Pipeline stopped: {} frames captured, {} detection cycles",
            self.source.frames_captured(),
            self.detector.cycle_count()
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl SnapshotProvider for PipelineController {
    fn capture_frame_and_faces(&self) -> Option<DetectionSnapshot> {
        self.detector.capture_frame_and_faces()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Pipeline shutdown on drop: {e}");
        }
    }
}
