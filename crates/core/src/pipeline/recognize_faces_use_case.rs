use std::sync::Arc;

use crate::detection::domain::detection_result::SnapshotProvider;
use crate::recognition::domain::recognition_model::{
    Recognition, RecognitionError, RecognitionModel,
};
use crate::recognition::infrastructure::image_preprocessor::ImagePreprocessor;
use crate::shared::log_sink::LogSink;
use crate::shared::region::Region;

#[derive(Debug, PartialEq)]
pub enum RecognizeOutcome {
    NotTrained,
    /// No detection cycle has completed yet.
    NotReady,
    NoFaces,
    /// One recognition per face, in detection order.
    Recognized(Vec<(Region, Recognition)>),
}

/// Labels every face of the latest snapshot.
pub struct RecognizeFacesUseCase {
    provider: Arc<dyn SnapshotProvider>,
    preprocessor: ImagePreprocessor,
    log: Arc<dyn LogSink>,
}

impl RecognizeFacesUseCase {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        preprocessor: ImagePreprocessor,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            provider,
            preprocessor,
            log,
        }
    }

    pub fn execute(&self, model: &RecognitionModel) -> Result<RecognizeOutcome, RecognitionError> {
        if !model.trained() {
            self.log.log("Recognizer is not trained");
            return Ok(RecognizeOutcome::NotTrained);
        }
        let Some(snapshot) = self.provider.capture_frame_and_faces() else {
            self.log.log("No frame captured yet");
            return Ok(RecognizeOutcome::NotReady);
        };
        if !snapshot.has_faces() {
            self.log.log("No faces detected");
            return Ok(RecognizeOutcome::NoFaces);
        }

        let mut recognized = Vec::new();
        for region in snapshot.face_regions() {
            let image = match self.preprocessor.process_image(&snapshot.frame.crop(&region)) {
                Ok(image) => image,
                Err(e) => {
                    self.log.log(&format!("Skipping face at {region:?}: {e}"));
                    continue;
                }
            };
            let recognition = model.recognize(&image)?;
            self.log.log(&format!("Recognized: {}", recognition.label));
            recognized.push((region, recognition));
        }
        Ok(RecognizeOutcome::Recognized(recognized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_result::{
        DetectedFace, DetectionResult, DetectionSnapshot,
    };
    use crate::recognition::domain::training_image::TrainingImage;
    use crate::recognition::infrastructure::correlation_recognizer::CorrelationRecognizer;
    use crate::shared::frame::Frame;
    use crate::shared::log_sink::MemoryLogSink;

    struct FixedProvider(Option<DetectionSnapshot>);

    impl SnapshotProvider for FixedProvider {
        fn capture_frame_and_faces(&self) -> Option<DetectionSnapshot> {
            self.0.clone()
        }
    }

    fn use_case(provider: FixedProvider) -> (RecognizeFacesUseCase, Arc<MemoryLogSink>) {
        let sink = Arc::new(MemoryLogSink::new());
        let uc = RecognizeFacesUseCase::new(
            Arc::new(provider),
            ImagePreprocessor::default(),
            sink.clone(),
        );
        (uc, sink)
    }

    fn untrained() -> RecognitionModel {
        RecognitionModel::new(Box::new(CorrelationRecognizer::new(150, 200)), 0.5)
    }

    #[test]
    fn test_untrained_model_gives_explicit_signal() {
        let (uc, sink) = use_case(FixedProvider(None));
        assert_eq!(
            uc.execute(&untrained()).unwrap(),
            RecognizeOutcome::NotTrained
        );
        assert!(sink.contains("not trained"));
    }

    #[test]
    fn test_trained_model_without_faces() {
        let mut model = untrained();
        for (label, horizontal) in [("alice", true), ("bob", false)] {
            let pixels = image::GrayImage::from_fn(150, 200, |x, y| {
                image::Luma([(if horizontal { x } else { y }) as u8])
            });
            model
                .stage(TrainingImage::new(label, format!("{label}.png"), pixels))
                .unwrap();
        }
        model.train().unwrap();

        let snapshot = DetectionSnapshot {
            frame: Arc::new(Frame::new(vec![0u8; 12], 2, 2, 3, 0)),
            result: Arc::new(DetectionResult::new(1, Vec::<DetectedFace>::new())),
        };
        let (uc, _) = use_case(FixedProvider(Some(snapshot)));
        assert_eq!(uc.execute(&model).unwrap(), RecognizeOutcome::NoFaces);
    }
}
