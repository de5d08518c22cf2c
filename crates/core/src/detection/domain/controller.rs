use crate::detection::domain::detection_result::DetectionSnapshot;

/// Observer notified with every published frame/detection pair.
///
/// Called on the detection thread; keep the callback short (copy what you
/// need and hand off). A callback must not block on a thread that may be
/// inside `FeatureDetector::remove_controller`.
pub trait DetectionController: Send + Sync {
    fn on_detection(&self, snapshot: &DetectionSnapshot);
}

/// Handle returned on registration, used to deregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ControllerId(pub(crate) u64);
