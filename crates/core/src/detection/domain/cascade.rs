use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::backend::BackendError;
use crate::shared::constants::DEFAULT_SCALE_STEP;
use crate::shared::frame::Frame;
use crate::shared::region::{FeatureKind, Region};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("{kind} cascade not found at {path}")]
    MissingCascade { kind: FeatureKind, path: PathBuf },
    #[error("{kind} cascade at {path} could not be loaded: {reason}")]
    InvalidCascade {
        kind: FeatureKind,
        path: PathBuf,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tuning shared by every cascade of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Minimum backend score for a hit to be reported.
    pub confidence: f64,
    /// Image pyramid step for backends that scan multiple scales.
    pub scale_step: f64,
    /// Faces smaller than this (either side, pixels) are discarded.
    pub min_face_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            scale_step: DEFAULT_SCALE_STEP,
            min_face_size: 20,
        }
    }
}

/// Domain interface for a single-feature classifier.
///
/// `detect` receives the image to search (a whole frame for faces, a face
/// crop for sub-features) and returns hits in that image's own coordinates.
/// Implementations may be stateful, hence `&mut self`.
pub trait Cascade: Send {
    fn kind(&self) -> FeatureKind;

    fn detect(
        &mut self,
        image: &Frame,
        params: &DetectionParams,
    ) -> Result<Vec<Region>, BackendError>;
}

/// Loads named cascade resources; one resource per feature kind.
pub trait CascadeLoader: Send + Sync {
    fn load(&self, kind: FeatureKind, path: &Path) -> Result<Box<dyn Cascade>, ConfigurationError>;
}
