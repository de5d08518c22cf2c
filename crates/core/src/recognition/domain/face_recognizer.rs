use image::GrayImage;

use crate::recognition::domain::training_image::TrainingImage;
use crate::shared::backend::BackendError;

/// Best match for a query image.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Similarity to the matched identity; higher is closer.
    pub score: f64,
}

/// Domain interface for the numerical recognizer behind [`RecognitionModel`].
///
/// `train` replaces any previous model.
///
/// [`RecognitionModel`]: crate::recognition::domain::recognition_model::RecognitionModel
pub trait FaceRecognizer: Send {
    fn train(&mut self, samples: &[TrainingImage]) -> Result<(), BackendError>;

    fn predict(&self, image: &GrayImage) -> Result<Prediction, BackendError>;
}
