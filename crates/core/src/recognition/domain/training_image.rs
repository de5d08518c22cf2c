use std::path::PathBuf;

use image::GrayImage;

/// A canonical grayscale face image and the identity it belongs to.
#[derive(Clone, Debug)]
pub struct TrainingImage {
    pub label: String,
    pub path: PathBuf,
    pub pixels: GrayImage,
}

impl TrainingImage {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>, pixels: GrayImage) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            pixels,
        }
    }
}
