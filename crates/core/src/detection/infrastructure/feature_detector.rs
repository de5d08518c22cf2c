use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::capture::domain::frame_receiver::FrameReceiver;
use crate::capture::infrastructure::frame_ring::FrameRing;
use crate::detection::domain::cascade::{
    Cascade, CascadeLoader, ConfigurationError, DetectionParams,
};
use crate::detection::domain::controller::{ControllerId, DetectionController};
use crate::detection::domain::detection_result::{
    DetectedFace, DetectionResult, DetectionSnapshot, SnapshotProvider,
};
use crate::detection::infrastructure::controller_registry::ControllerRegistry;
use crate::shared::backend::BackendError;
use crate::shared::cancellation::CancelToken;
use crate::shared::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::shared::frame::Frame;
use crate::shared::log_sink::LogSink;
use crate::shared::region::FeatureKind;

/// Lifecycle of the detection loop. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DetectorState {
    Idle = 0,
    Running = 1,
    StopRequested = 2,
    Stopped = 3,
}

impl DetectorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::StopRequested,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for DetectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::StopRequested => "stop requested",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection loop cannot start: detector is {0}")]
    AlreadyStarted(DetectorState),
    #[error("{kind} cascade failed: {source}")]
    Cascade {
        kind: FeatureKind,
        #[source]
        source: BackendError,
    },
}

/// Cascaded feature detector with its own loop thread.
///
/// Frames are read from an inbox ring: by default a latest-only ring fed
/// through [`FrameReceiver`], or the capture ring of a frame source set with
/// [`with_inbox`](Self::with_inbox). Each cycle takes the newest frame, finds faces on the whole frame, then runs
/// every loaded sub-feature cascade on each face crop. The frame and its
/// result are published together, then controllers are notified.
pub struct FeatureDetector {
    face_cascade: Mutex<Box<dyn Cascade>>,
    sub_cascades: Mutex<Vec<(FeatureKind, Box<dyn Cascade>)>>,
    loader: Arc<dyn CascadeLoader>,
    params: DetectionParams,
    inbox: Arc<FrameRing>,
    latest: Mutex<Option<DetectionSnapshot>>,
    controllers: ControllerRegistry,
    state: AtomicU8,
    cancel: CancelToken,
    poll_interval: Duration,
    cycles: AtomicU64,
    log: Arc<dyn LogSink>,
}

impl FeatureDetector {
    /// Creates a detector with the face cascade loaded from `face_path`.
    pub fn new(
        loader: Arc<dyn CascadeLoader>,
        face_path: &Path,
        params: DetectionParams,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, ConfigurationError> {
        validate_params(&params)?;
        let face_cascade = loader.load(FeatureKind::Face, face_path)?;
        Ok(Self {
            face_cascade: Mutex::new(face_cascade),
            sub_cascades: Mutex::new(Vec::new()),
            loader,
            params,
            inbox: Arc::new(FrameRing::latest_only()),
            latest: Mutex::new(None),
            controllers: ControllerRegistry::new(),
            state: AtomicU8::new(DetectorState::Idle as u8),
            cancel: CancelToken::new(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            cycles: AtomicU64::new(0),
            log,
        })
    }

    /// Upper bound on how long the loop waits for a frame before re-checking
    /// its stop flag.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Reads frames from `inbox` instead of the private latest-only ring.
    pub fn with_inbox(mut self, inbox: Arc<FrameRing>) -> Self {
        self.inbox = inbox;
        self
    }

    /// Loads (or replaces) the cascade for `kind`.
    ///
    /// Loading [`FeatureKind::Face`] replaces the face cascade. May be called
    /// while the loop runs; the change applies from the next cycle.
    pub fn load_cascade(&self, kind: FeatureKind, path: &Path) -> Result<(), ConfigurationError> {
        let cascade = self.loader.load(kind, path)?;
        if kind == FeatureKind::Face {
            *self.face_cascade.lock().unwrap_or_else(|e| e.into_inner()) = cascade;
        } else {
            let mut subs = self.sub_cascades.lock().unwrap_or_else(|e| e.into_inner());
            match subs.iter_mut().find(|(k, _)| *k == kind) {
                Some(slot) => slot.1 = cascade,
                None => subs.push((kind, cascade)),
            }
        }
        self.log.log(&format!("Loaded {kind} cascade"));
        Ok(())
    }

    /// Feature kinds searched for on every cycle, face first.
    pub fn loaded_features(&self) -> Vec<FeatureKind> {
        let subs = self.sub_cascades.lock().unwrap_or_else(|e| e.into_inner());
        std::iter::once(FeatureKind::Face)
            .chain(subs.iter().map(|(kind, _)| *kind))
            .collect()
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn add_controller(&self, controller: Arc<dyn DetectionController>) -> ControllerId {
        self.controllers.add(controller)
    }

    /// Deregisters a controller. Once this returns the controller is not
    /// called again; from inside its own callback, the current call is the
    /// last.
    pub fn remove_controller(&self, id: ControllerId) -> bool {
        self.controllers.remove(id)
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn state(&self) -> DetectorState {
        DetectorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Asks the loop to exit after the current cycle.
    pub fn request_thread_stop(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match DetectorState::from_u8(current) {
                    DetectorState::Idle | DetectorState::Running => {
                        Some(DetectorState::StopRequested as u8)
                    }
                    _ => None,
                }
            });
    }

    /// Stop request plus cancellation of any pending frame wait.
    pub fn interrupt(&self) {
        self.request_thread_stop();
        self.cancel.cancel();
    }

    /// Completed detection cycles.
    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Loop entry point; run it on a dedicated thread. Callable once.
    ///
    /// Returns `Ok` when stopped on request (a stop requested before start
    /// makes this return immediately). A cascade failure is logged, stops
    /// the loop and is returned.
    pub fn thread_start(&self) -> Result<(), DetectorError> {
        if let Err(current) = self.state.compare_exchange(
            DetectorState::Idle as u8,
            DetectorState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match DetectorState::from_u8(current) {
                DetectorState::StopRequested => {
                    self.state
                        .store(DetectorState::Stopped as u8, Ordering::Release);
                    Ok(())
                }
                other => Err(DetectorError::AlreadyStarted(other)),
            };
        }
        log::debug!("Detection loop started");

        let outcome = self.run_loop();
        self.state
            .store(DetectorState::Stopped as u8, Ordering::Release);

        match &outcome {
            Ok(()) => log::debug!(
                "Detection loop stopped after {} cycle(s)",
                self.cycle_count()
            ),
            Err(e) => {
                log::error!("Detection loop failed: {e}");
                self.log.log(&format!("Detection stopped: {e}"));
            }
        }
        outcome
    }

    fn run_loop(&self) -> Result<(), DetectorError> {
        while self.keep_running() {
            let Some(frame) = self.inbox.wait_latest(self.poll_interval) else {
                continue;
            };
            if !self.keep_running() {
                break;
            }
            self.run_cycle(frame)?;
        }
        Ok(())
    }

    fn keep_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.state() == DetectorState::Running
    }

    /// One detection cycle: detect, publish, notify.
    fn run_cycle(&self, frame: Arc<Frame>) -> Result<(), DetectorError> {
        let faces = self.detect_faces(&frame)?;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot = DetectionSnapshot {
            frame,
            result: Arc::new(DetectionResult::new(cycle, faces)),
        };

        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        self.controllers.notify(&snapshot);
        Ok(())
    }

    fn detect_faces(&self, frame: &Frame) -> Result<Vec<DetectedFace>, DetectorError> {
        let hits = {
            let mut cascade = self.face_cascade.lock().unwrap_or_else(|e| e.into_inner());
            cascade
                .detect(frame, &self.params)
                .map_err(|source| DetectorError::Cascade {
                    kind: FeatureKind::Face,
                    source,
                })?
        };

        let min_size = self.params.min_face_size as i32;
        let mut subs = self.sub_cascades.lock().unwrap_or_else(|e| e.into_inner());
        let mut faces = Vec::with_capacity(hits.len());

        for hit in hits {
            let Some(face) = hit
                .with_kind(FeatureKind::Face)
                .within(frame.width(), frame.height())
            else {
                continue;
            };
            if face.width < min_size || face.height < min_size {
                continue;
            }

            let mut features = Vec::new();
            if !subs.is_empty() {
                let crop = frame.crop(&face);
                for (kind, cascade) in subs.iter_mut() {
                    let found = cascade
                        .detect(&crop, &self.params)
                        .map_err(|source| DetectorError::Cascade { kind: *kind, source })?;
                    features.extend(
                        found
                            .into_iter()
                            .map(|r| r.with_kind(*kind).offset(face.x, face.y)),
                    );
                }
            }
            faces.push(DetectedFace::new(face, features));
        }
        Ok(faces)
    }
}

impl FrameReceiver for FeatureDetector {
    fn receive_frame(&self, frame: Arc<Frame>) {
        self.inbox.push(frame);
    }
}

impl SnapshotProvider for FeatureDetector {
    fn capture_frame_and_faces(&self) -> Option<DetectionSnapshot> {
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn validate_params(params: &DetectionParams) -> Result<(), ConfigurationError> {
    if !(0.0..=1.0).contains(&params.confidence) {
        return Err(ConfigurationError::Invalid(format!(
            "detection confidence must be within [0, 1], got {}",
            params.confidence
        )));
    }
    if params.scale_step.is_nan() || params.scale_step <= 1.0 {
        return Err(ConfigurationError::Invalid(format!(
            "scale step must be greater than 1, got {}",
            params.scale_step
        )));
    }
    Ok(())
}
