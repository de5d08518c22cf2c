pub mod capture_training_image_use_case;
pub mod infrastructure;
pub mod pipeline_controller;
pub mod recognize_faces_use_case;
pub mod train_recognizer_use_case;
