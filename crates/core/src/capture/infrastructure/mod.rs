pub mod frame_ring;
pub mod frame_source;
pub mod image_sequence_device;
#[cfg(feature = "webcam")]
pub mod webcam_device;
