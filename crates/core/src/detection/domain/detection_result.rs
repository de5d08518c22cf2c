use std::sync::Arc;

use crate::shared::frame::Frame;
use crate::shared::region::{FeatureKind, Region};

/// A detected face and the sub-features found inside it.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedFace {
    face: Region,
    features: Vec<Region>,
}

impl DetectedFace {
    /// Builds a face, clamping every feature to the face bounds.
    ///
    /// Features with nothing left inside the face are dropped, so every
    /// `DetectedFace` satisfies the containment invariant by construction.
    pub fn new(face: Region, features: Vec<Region>) -> Self {
        let face = face.with_kind(FeatureKind::Face);
        let features = features
            .iter()
            .filter_map(|f| f.clamp_to(&face))
            .collect();
        Self { face, features }
    }

    pub fn face(&self) -> &Region {
        &self.face
    }

    pub fn features(&self) -> &[Region] {
        &self.features
    }

    pub fn features_of(&self, kind: FeatureKind) -> impl Iterator<Item = &Region> {
        self.features.iter().filter(move |f| f.kind == kind)
    }
}

/// Everything one detection cycle found, in detector order.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    cycle: u64,
    faces: Vec<DetectedFace>,
}

impl DetectionResult {
    pub fn new(cycle: u64, faces: Vec<DetectedFace>) -> Self {
        Self { cycle, faces }
    }

    /// 1-based number of the cycle that produced this result.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn faces(&self) -> &[DetectedFace] {
        &self.faces
    }

    pub fn face_regions(&self) -> Vec<Region> {
        self.faces.iter().map(|f| f.face).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }
}

/// A frame and the result computed from it, published as one unit.
#[derive(Clone, Debug)]
pub struct DetectionSnapshot {
    pub frame: Arc<Frame>,
    pub result: Arc<DetectionResult>,
}

impl DetectionSnapshot {
    pub fn face_regions(&self) -> Vec<Region> {
        self.result.face_regions()
    }

    pub fn has_faces(&self) -> bool {
        !self.result.is_empty()
    }
}

/// Read access to the most recently published snapshot.
pub trait SnapshotProvider: Send + Sync {
    /// The latest frame together with its faces; `None` before the first
    /// cycle completes. Never waits on an in-flight cycle.
    fn capture_frame_and_faces(&self) -> Option<DetectionSnapshot>;
}
