use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::GrayImage;
use thiserror::Error;

use crate::recognition::domain::face_recognizer::FaceRecognizer;
use crate::recognition::domain::training_image::TrainingImage;
use crate::shared::backend::BackendError;
use crate::shared::constants::UNKNOWN_LABEL;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Untrained,
    Trained,
}

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("no training samples staged")]
    NoSamples,
    #[error("training needs at least two distinct labels, found {found}")]
    TooFewLabels { found: usize },
    #[error("invalid label {0:?}")]
    InvalidLabel(String),
    #[error("failed to read training image {path}: {source}")]
    SampleRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read training corpus {path}: {source}")]
    CorpusRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("recognizer training failed: {0}")]
    Backend(#[source] BackendError),
}

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("recognition model is not trained")]
    NotTrained,
    #[error("recognizer failed: {0}")]
    Backend(#[source] BackendError),
}

/// What a successful training run was built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingSummary {
    pub samples: usize,
    /// Distinct labels, sorted.
    pub labels: Vec<String>,
}

/// Outcome of recognizing one face.
#[derive(Clone, Debug, PartialEq)]
pub struct Recognition {
    /// Matched identity, or [`UNKNOWN_LABEL`] below the threshold.
    pub label: String,
    pub score: f64,
}

impl Recognition {
    pub fn is_known(&self) -> bool {
        self.label != UNKNOWN_LABEL
    }
}

/// Trainable identity model with an explicit Untrained/Trained state.
///
/// Samples are staged with [`add_training_image`](Self::add_training_image)
/// and only take effect on the next [`train`](Self::train), which rebuilds
/// the model from scratch.
pub struct RecognitionModel {
    backend: Box<dyn FaceRecognizer>,
    threshold: f64,
    staged: Vec<TrainingImage>,
    state: ModelState,
}

impl RecognitionModel {
    /// `threshold` is the minimum backend score for a match to be reported
    /// under its label.
    pub fn new(backend: Box<dyn FaceRecognizer>, threshold: f64) -> Self {
        Self {
            backend,
            threshold,
            staged: Vec::new(),
            state: ModelState::Untrained,
        }
    }

    /// Reads the image at `path` as grayscale and stages it under `label`.
    pub fn add_training_image(&mut self, path: &Path, label: &str) -> Result<(), TrainingError> {
        let pixels = image::open(path)
            .map_err(|source| TrainingError::SampleRead {
                path: path.to_path_buf(),
                source,
            })?
            .to_luma8();
        self.stage(TrainingImage::new(label, path, pixels))
    }

    /// Stages an already decoded sample.
    pub fn stage(&mut self, sample: TrainingImage) -> Result<(), TrainingError> {
        if sample.label.trim().is_empty() || sample.label == UNKNOWN_LABEL {
            return Err(TrainingError::InvalidLabel(sample.label));
        }
        self.staged.push(sample);
        Ok(())
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Drops every staged sample without touching the trained model.
    pub fn clear_staged(&mut self) {
        self.staged.clear();
    }

    /// Builds a new model from every staged sample.
    ///
    /// The previous model is discarded first, so any failure leaves the
    /// model Untrained. Staged samples are consumed on success and kept on
    /// failure.
    pub fn train(&mut self) -> Result<TrainingSummary, TrainingError> {
        self.state = ModelState::Untrained;

        if self.staged.is_empty() {
            return Err(TrainingError::NoSamples);
        }
        let labels: BTreeSet<&str> = self.staged.iter().map(|s| s.label.as_str()).collect();
        if labels.len() < 2 {
            return Err(TrainingError::TooFewLabels {
                found: labels.len(),
            });
        }
        let summary = TrainingSummary {
            samples: self.staged.len(),
            labels: labels.into_iter().map(str::to_owned).collect(),
        };

        self.backend
            .train(&self.staged)
            .map_err(TrainingError::Backend)?;

        self.staged.clear();
        self.state = ModelState::Trained;
        log::info!(
            "Trained recognizer on {} sample(s), {} label(s)",
            summary.samples,
            summary.labels.len()
        );
        Ok(summary)
    }

    pub fn trained(&self) -> bool {
        self.state == ModelState::Trained
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Labels a canonical face image. Rejected while Untrained.
    pub fn recognize(&self, image: &GrayImage) -> Result<Recognition, RecognitionError> {
        if !self.trained() {
            return Err(RecognitionError::NotTrained);
        }
        let prediction = self
            .backend
            .predict(image)
            .map_err(RecognitionError::Backend)?;

        let label = if prediction.score >= self.threshold {
            prediction.label
        } else {
            UNKNOWN_LABEL.to_string()
        };
        Ok(Recognition {
            label,
            score: prediction.score,
        })
    }
}
