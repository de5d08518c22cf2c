use std::sync::Arc;

use crate::recognition::domain::recognition_model::{
    RecognitionModel, TrainingError, TrainingSummary,
};
use crate::recognition::infrastructure::training_corpus::TrainingCorpus;
use crate::shared::log_sink::LogSink;

/// Stages every corpus image and retrains the model from scratch.
pub struct TrainRecognizerUseCase {
    corpus: TrainingCorpus,
    log: Arc<dyn LogSink>,
}

impl TrainRecognizerUseCase {
    pub fn new(corpus: TrainingCorpus, log: Arc<dyn LogSink>) -> Self {
        Self { corpus, log }
    }

    /// Unreadable or non-image files are logged and skipped. Samples left
    /// staged by an earlier failed run are discarded, so each run trains on
    /// the corpus as it is now.
    pub fn execute(&self, model: &mut RecognitionModel) -> Result<TrainingSummary, TrainingError> {
        let scan = match self.corpus.scan() {
            Ok(scan) => scan,
            Err(e) => {
                self.log.log(&format!("Training failed: {e}"));
                return Err(e);
            }
        };
        for path in &scan.skipped {
            self.log
                .log(&format!("Skipping non-image file {}", path.display()));
        }
        model.clear_staged();
        for entry in &scan.entries {
            if let Err(e) = model.add_training_image(&entry.path, &entry.label) {
                self.log.log(&format!("Skipping {}: {e}", entry.path.display()));
            }
        }

        match model.train() {
            Ok(summary) => {
                self.log.log(&format!(
                    "Training complete: {} image(s), labels: {}",
                    summary.samples,
                    summary.labels.join(", ")
                ));
                Ok(summary)
            }
            Err(e) => {
                self.log.log(&format!("Training failed: {e}"));
                Err(e)
            }
        }
    }
}
