#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use receptionist_core::capture::domain::frame_device::{DeviceError, FrameDevice};
use receptionist_core::config::ReceptionistConfig;
use receptionist_core::detection::domain::cascade::{
    Cascade, CascadeLoader, ConfigurationError, DetectionParams,
};
use receptionist_core::detection::domain::controller::DetectionController;
use receptionist_core::detection::domain::detection_result::DetectionSnapshot;
use receptionist_core::shared::backend::BackendError;
use receptionist_core::shared::cancellation::CancelToken;
use receptionist_core::shared::frame::Frame;
use receptionist_core::shared::region::{FeatureKind, Region};

pub const FRAME_WIDTH: u32 = 320;
pub const FRAME_HEIGHT: u32 = 240;

/// Emits gradient frames numbered 0, 1, 2, ...; after `limit` frames it
/// blocks until cancelled, or disconnects when built with `disconnecting`.
pub struct CountingDevice {
    next: u64,
    limit: Option<u64>,
    interval: Duration,
    disconnect_at_limit: bool,
}

impl CountingDevice {
    pub fn paced(interval: Duration) -> Self {
        Self {
            next: 0,
            limit: None,
            interval,
            disconnect_at_limit: false,
        }
    }

    pub fn burst(limit: u64) -> Self {
        Self {
            next: 0,
            limit: Some(limit),
            interval: Duration::ZERO,
            disconnect_at_limit: false,
        }
    }

    pub fn disconnecting(limit: u64) -> Self {
        Self {
            disconnect_at_limit: true,
            ..Self::burst(limit)
        }
    }
}

impl FrameDevice for CountingDevice {
    fn grab(&mut self, cancel: &CancelToken) -> Result<Frame, DeviceError> {
        if self.limit.is_some_and(|limit| self.next >= limit) {
            if self.disconnect_at_limit {
                return Err(DeviceError::Disconnected("unplugged".to_string()));
            }
            while cancel.sleep(Duration::from_millis(10)) {}
            return Err(DeviceError::Interrupted);
        }
        if !self.interval.is_zero() && !cancel.sleep(self.interval) {
            return Err(DeviceError::Interrupted);
        }
        let frame = gradient_frame(FRAME_WIDTH, FRAME_HEIGHT, self.next);
        self.next += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        "counting device".to_string()
    }
}

pub fn gradient_frame(width: u32, height: u32, index: u64) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / width) as u8);
            data.push((y * 255 / height) as u8);
            data.push(((x + y) % 256) as u8);
        }
    }
    Frame::new(data, width, height, 3, index)
}

/// x coordinate the index cascade reports for frame `index`.
pub fn face_x_for(index: u64) -> i32 {
    (index % 200) as i32 + 10
}

/// Face cascade whose single hit encodes the frame index in its x.
pub struct IndexCascade {
    pub delay: Duration,
}

impl Cascade for IndexCascade {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Face
    }

    fn detect(
        &mut self,
        image: &Frame,
        _params: &DetectionParams,
    ) -> Result<Vec<Region>, BackendError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(vec![Region::new(
            face_x_for(image.index()),
            20,
            60,
            80,
            FeatureKind::Face,
        )])
    }
}

/// Returns the same regions for every image.
pub struct FixedCascade {
    pub kind: FeatureKind,
    pub hits: Vec<Region>,
}

impl Cascade for FixedCascade {
    fn kind(&self) -> FeatureKind {
        self.kind
    }

    fn detect(
        &mut self,
        _image: &Frame,
        _params: &DetectionParams,
    ) -> Result<Vec<Region>, BackendError> {
        Ok(self.hits.clone())
    }
}

type CascadeFactory = dyn Fn(FeatureKind) -> Box<dyn Cascade> + Send + Sync;

/// Builds cascades from a closure; any path whose stem is `missing` fails.
pub struct FakeLoader {
    factory: Box<CascadeFactory>,
}

impl FakeLoader {
    pub fn new(factory: impl Fn(FeatureKind) -> Box<dyn Cascade> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
        }
    }

    /// Index-encoding faces; every sub-feature cascade reports one box that
    /// spills past the bottom-right corner of its face crop.
    pub fn standard(face_delay: Duration) -> Self {
        Self::new(move |kind| -> Box<dyn Cascade> {
            match kind {
                FeatureKind::Face => Box::new(IndexCascade { delay: face_delay }),
                other => Box::new(FixedCascade {
                    kind: other,
                    hits: vec![
                        Region::new(5, 5, 20, 10, other),
                        Region::new(50, 70, 30, 30, other),
                    ],
                }),
            }
        })
    }
}

impl CascadeLoader for FakeLoader {
    fn load(&self, kind: FeatureKind, path: &Path) -> Result<Box<dyn Cascade>, ConfigurationError> {
        if path.file_stem().and_then(|s| s.to_str()) == Some("missing") {
            return Err(ConfigurationError::MissingCascade {
                kind,
                path: path.to_path_buf(),
            });
        }
        Ok((self.factory)(kind))
    }
}

/// Counts notifications and keeps the last snapshot.
#[derive(Default)]
pub struct RecordingController {
    calls: AtomicUsize,
    last: Mutex<Option<DetectionSnapshot>>,
}

impl RecordingController {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<DetectionSnapshot> {
        self.last.lock().unwrap().clone()
    }
}

impl DetectionController for RecordingController {
    fn on_detection(&self, snapshot: &DetectionSnapshot) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(snapshot.clone());
    }
}

pub fn test_config() -> ReceptionistConfig {
    let mut config = ReceptionistConfig::default();
    config.cascades.face = "face.onnx".into();
    config.poll_interval_ms = 5;
    config.shutdown_timeout_ms = 2000;
    config
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
