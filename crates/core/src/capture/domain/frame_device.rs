use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::shared::cancellation::CancelToken;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
    #[error("capture device disconnected: {0}")]
    Disconnected(String),
    #[error("no frame from capture device within {0:?}")]
    Timeout(Duration),
    #[error("capture interrupted")]
    Interrupted,
    #[error("failed to decode frame from {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl DeviceError {
    /// Transient errors leave the device usable; the capture loop retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Timeout(_))
    }
}

/// A source of video frames (camera, image sequence, ...).
///
/// The device is opened when constructed and released when dropped, so its
/// lifetime is scoped to the `FrameSource` that owns it.
pub trait FrameDevice: Send {
    /// Blocks until the device yields its next frame.
    ///
    /// Implementations must return `DeviceError::Interrupted` promptly once
    /// `cancel` fires, and must not block longer than their own hard timeout.
    fn grab(&mut self, cancel: &CancelToken) -> Result<Frame, DeviceError>;

    /// Human-readable identification for log messages.
    fn describe(&self) -> String;
}
