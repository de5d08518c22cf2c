pub mod correlation_recognizer;
pub mod image_preprocessor;
pub mod training_corpus;
