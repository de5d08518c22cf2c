use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{CANONICAL_HEIGHT, CANONICAL_WIDTH};
use crate::shared::frame::Frame;

/// Canonical form of a stored or queried face image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub width: u32,
    pub height: u32,
    /// Histogram-equalize after the grayscale conversion.
    pub equalize: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: CANONICAL_WIDTH,
            height: CANONICAL_HEIGHT,
            equalize: true,
        }
    }
}

/// Normalization and persistence failures. Reported per attempt.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("cannot normalize an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
    #[error("{width}x{height} image is not in canonical form")]
    NotCanonical { width: u32, height: u32 },
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),
    #[error("invalid filename {0:?}")]
    InvalidFilename(String),
    #[error("unsupported image format for {0:?}")]
    UnsupportedFormat(String),
    #[error("no base path configured for saved images")]
    NoBasePath,
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Turns face crops into canonical grayscale images, optionally saving them
/// into the training corpus.
pub struct ImagePreprocessor {
    config: PreprocessConfig,
    base_path: Option<PathBuf>,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            config,
            base_path: None,
        }
    }

    /// Directory that [`process_and_save_image`](Self::process_and_save_image)
    /// writes into. Created on first save.
    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Normalizes `image` to canonical size and grayscale.
    ///
    /// Input that is already single-channel at the canonical size is
    /// returned unchanged, which makes the operation idempotent.
    pub fn process_image(&self, image: &Frame) -> Result<GrayImage, PreprocessError> {
        if image.is_empty() {
            return Err(PreprocessError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }
        let (width, height) = (self.config.width, self.config.height);

        let decoded = image
            .to_image()
            .ok_or(PreprocessError::UnsupportedChannels(image.channels()))?;
        if image.channels() == 1 && image.width() == width && image.height() == height {
            return Ok(decoded.into_luma8());
        }

        let mut gray = decoded.to_luma8();
        if gray.dimensions() != (width, height) {
            gray = image::imageops::resize(&gray, width, height, FilterType::Triangle);
        }
        if self.config.equalize {
            gray = imageproc::contrast::equalize_histogram(&gray);
        }
        Ok(gray)
    }

    /// Normalizes `image` and writes it to `<base_path>/<filename>`.
    ///
    /// `filename` must be a bare file name; its extension picks the format.
    pub fn process_and_save_image(
        &self,
        image: &Frame,
        filename: &str,
    ) -> Result<PathBuf, PreprocessError> {
        let format = validate_filename(filename)?;
        let base = self.base_path.as_deref().ok_or(PreprocessError::NoBasePath)?;
        let processed = self.process_image(image)?;
        write_image(&processed, base, filename, format)
    }

    /// Writes an image that [`process_image`](Self::process_image) already
    /// produced, without normalizing it again.
    pub fn save_processed(
        &self,
        processed: &GrayImage,
        filename: &str,
    ) -> Result<PathBuf, PreprocessError> {
        let format = validate_filename(filename)?;
        let base = self.base_path.as_deref().ok_or(PreprocessError::NoBasePath)?;
        let (width, height) = processed.dimensions();
        if (width, height) != (self.config.width, self.config.height) {
            return Err(PreprocessError::NotCanonical { width, height });
        }
        write_image(processed, base, filename, format)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

fn write_image(
    processed: &GrayImage,
    base: &Path,
    filename: &str,
    format: ImageFormat,
) -> Result<PathBuf, PreprocessError> {
    std::fs::create_dir_all(base).map_err(|source| PreprocessError::CreateDir {
        path: base.to_path_buf(),
        source,
    })?;
    let path = base.join(filename);
    processed
        .save_with_format(&path, format)
        .map_err(|source| PreprocessError::Write {
            path: path.clone(),
            source,
        })?;

    log::debug!("Saved training image {}", path.display());
    Ok(path)
}

/// Accepts a bare `stem.ext` name with a known image extension.
fn validate_filename(filename: &str) -> Result<ImageFormat, PreprocessError> {
    let invalid = || PreprocessError::InvalidFilename(filename.to_string());
    let path = Path::new(filename);

    if path.file_name().and_then(|n| n.to_str()) != Some(filename) {
        return Err(invalid());
    }
    let has_stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| !s.trim().is_empty());
    if !has_stem || path.extension().is_none() {
        return Err(invalid());
    }
    ImageFormat::from_path(path)
        .map_err(|_| PreprocessError::UnsupportedFormat(filename.to_string()))
}
