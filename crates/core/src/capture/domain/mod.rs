pub mod frame_device;
pub mod frame_receiver;
