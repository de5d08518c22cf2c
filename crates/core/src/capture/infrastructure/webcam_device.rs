use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use crate::capture::domain::frame_device::{DeviceError, FrameDevice};
use crate::shared::cancellation::CancelToken;
use crate::shared::frame::Frame;

/// Live camera identified by its device index.
///
/// The stream is opened on construction and stopped on drop.
pub struct WebcamDevice {
    camera: Camera,
    device_index: u32,
    next_index: u64,
}

// Safety: the camera handle is only touched from whichever single thread
// holds the owning `FrameSource` device lock.
unsafe impl Send for WebcamDevice {}

impl WebcamDevice {
    pub fn open(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self, DeviceError> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut camera = Camera::new(CameraIndex::Index(device_index), requested)
            .map_err(|e| DeviceError::Unavailable(format!("webcam {device_index}: {e}")))?;
        camera
            .open_stream()
            .map_err(|e| DeviceError::Unavailable(format!("webcam {device_index} stream: {e}")))?;

        if let Err(e) = camera.set_resolution(Resolution::new(width, height)) {
            log::warn!("Could not set resolution {width}x{height}: {e}. Using camera default.");
        }
        if let Err(e) = camera.set_frame_rate(fps) {
            log::warn!("Could not set frame rate {fps} fps: {e}. Using camera default.");
        }

        let actual = camera.resolution();
        log::info!(
            "Webcam {device_index} opened: {}x{} @ {} fps",
            actual.width(),
            actual.height(),
            camera.frame_rate()
        );
        Ok(Self {
            camera,
            device_index,
            next_index: 0,
        })
    }
}

impl FrameDevice for WebcamDevice {
    fn grab(&mut self, cancel: &CancelToken) -> Result<Frame, DeviceError> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Interrupted);
        }
        let buffer = self
            .camera
            .frame()
            .map_err(|e| DeviceError::Disconnected(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| DeviceError::Disconnected(format!("decode: {e}")))?;

        let (width, height) = (decoded.width(), decoded.height());
        let frame = Frame::new(decoded.into_raw(), width, height, 3, self.next_index);
        self.next_index += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("webcam {}", self.device_index)
    }
}

impl Drop for WebcamDevice {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop webcam {} stream: {e}", self.device_index);
        }
    }
}
