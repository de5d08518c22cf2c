use std::sync::Arc;

use crate::shared::frame::Frame;

/// Consumer registered with a `FrameSource`, called once per captured frame
/// from the capture thread. Implementations should return quickly.
pub trait FrameReceiver: Send + Sync {
    fn receive_frame(&self, frame: Arc<Frame>);
}
