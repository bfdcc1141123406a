/// Frame capture module
///
/// This module handles:
/// - Streaming the webcam on its own thread (camera.rs)
/// - Turning the current frame into a mirrored JPEG shot (frame.rs)
/// - The countdown and flash around each shot (countdown.rs)

pub mod camera;
pub mod countdown;
pub mod frame;

pub use camera::LiveFeed;
pub use countdown::Sequencer;
pub use frame::capture_frame;

use image::RgbImage;

/// Anything that can hand out the current video frame
pub trait VideoFeed: Send + Sync {
    /// The newest frame, unmirrored; `None` until the device delivers one
    fn current_frame(&self) -> Option<RgbImage>;

    /// Stop streaming and free the device
    fn release(&self) {}
}

/// One encoded shot
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("bytes", &self.jpeg.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
