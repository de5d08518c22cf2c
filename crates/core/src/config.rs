use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::domain::frame_device::{DeviceError, FrameDevice};
use crate::capture::infrastructure::image_sequence_device::ImageSequenceDevice;
use crate::detection::domain::cascade::DetectionParams;
use crate::recognition::infrastructure::image_preprocessor::PreprocessConfig;
use crate::shared::constants::{
    DEFAULT_FRAME_CAPACITY, DEFAULT_MATCH_THRESHOLD, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
use crate::shared::region::FeatureKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("no configuration directory on this platform")]
    NoConfigDir,
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceConfig {
    ImageSequence {
        directory: PathBuf,
        fps: u32,
        #[serde(default)]
        looped: bool,
    },
    Webcam {
        index: u32,
        width: u32,
        height: u32,
        fps: u32,
    },
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::Webcam {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl DeviceConfig {
    /// Opens the configured device.
    pub fn open(&self) -> Result<Box<dyn FrameDevice>, DeviceError> {
        match self {
            Self::ImageSequence {
                directory,
                fps,
                looped,
            } => Ok(Box::new(ImageSequenceDevice::open(directory, *fps, *looped)?)),
            #[cfg(feature = "webcam")]
            Self::Webcam {
                index,
                width,
                height,
                fps,
            } => Ok(Box::new(
                crate::capture::infrastructure::webcam_device::WebcamDevice::open(
                    *index, *width, *height, *fps,
                )?,
            )),
            #[cfg(not(feature = "webcam"))]
            Self::Webcam { index, .. } => Err(DeviceError::Unavailable(format!(
                "webcam {index}: built without the `webcam` feature"
            ))),
        }
    }
}

/// Cascade model files, one per feature kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    pub face: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eyes: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nose: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouth: Option<PathBuf>,
}

impl CascadeConfig {
    pub fn path_for(&self, kind: FeatureKind) -> Option<&Path> {
        match kind {
            FeatureKind::Face => Some(&self.face),
            FeatureKind::Eyes => self.eyes.as_deref(),
            FeatureKind::Nose => self.nose.as_deref(),
            FeatureKind::Mouth => self.mouth.as_deref(),
        }
    }

    /// Configured sub-feature cascades in eyes, nose, mouth order.
    pub fn sub_features(&self) -> Vec<(FeatureKind, &Path)> {
        FeatureKind::SUB_FEATURES
            .iter()
            .filter_map(|&kind| self.path_for(kind).map(|path| (kind, path)))
            .collect()
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        let dir = default_data_dir().join("cascades");
        Self {
            face: dir.join("face.onnx"),
            eyes: None,
            nose: None,
            mouth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceptionistConfig {
    pub device: DeviceConfig,
    pub frame_capacity: usize,
    pub cascades: CascadeConfig,
    pub detection: DetectionParams,
    pub corpus_dir: PathBuf,
    pub preprocessing: PreprocessConfig,
    /// Minimum correlation for a match to be reported under its label.
    pub match_threshold: f64,
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for ReceptionistConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            cascades: CascadeConfig::default(),
            detection: DetectionParams::default(),
            corpus_dir: default_data_dir().join("faces"),
            preprocessing: PreprocessConfig::default(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ReceptionistConfig {
    /// `<config dir>/receptionist/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("receptionist").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from [`default_path`](Self::default_path), falling back to
    /// defaults when no file exists there yet.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if self.frame_capacity == 0 {
            return invalid("frame_capacity", "must be at least 1");
        }
        if self.preprocessing.width == 0 || self.preprocessing.height == 0 {
            return invalid("preprocessing", "canonical size must be non-zero");
        }
        if !(-1.0..=1.0).contains(&self.match_threshold) {
            return invalid("match_threshold", "must be within [-1, 1]");
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return invalid("detection.confidence", "must be within [0, 1]");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms", "must be positive");
        }
        if let DeviceConfig::ImageSequence { fps: 0, .. } | DeviceConfig::Webcam { fps: 0, .. } =
            self.device
        {
            return invalid("device.fps", "must be positive");
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("receptionist")
}
