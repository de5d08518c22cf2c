pub mod face_recognizer;
pub mod recognition_model;
pub mod training_image;
