/// Single-frame capture: mirror the current frame and encode it as JPEG

use image::{codecs::jpeg::JpegEncoder, imageops, ExtendedColorType};

use super::{CapturedFrame, VideoFeed};
use crate::error::CaptureError;

/// Capture the feed's current frame at its native resolution
///
/// The frame is flipped horizontally to match the mirrored preview the
/// guest sees. No other transform is applied.
pub fn capture_frame(feed: &dyn VideoFeed, quality: u8) -> Result<CapturedFrame, CaptureError> {
    let frame = feed.current_frame().ok_or(CaptureError::FrameNotReady)?;
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptureError::FrameNotReady);
    }

    let mirrored = imageops::flip_horizontal(&frame);

    let mut jpeg = Vec::with_capacity((width * height / 4) as usize);
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode(
        mirrored.as_raw(),
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;

    tracing::debug!("📸 Captured {}x{} frame ({} KB)", width, height, jpeg.len() / 1024);

    Ok(CapturedFrame { jpeg, width, height })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Feed that serves a fixed frame (or none)
    pub(crate) struct StillFeed(pub Mutex<Option<RgbImage>>);

    impl StillFeed {
        pub(crate) fn new(frame: Option<RgbImage>) -> Self {
            Self(Mutex::new(frame))
        }
    }

    impl VideoFeed for StillFeed {
        fn current_frame(&self) -> Option<RgbImage> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Left half red, right half blue
    pub(crate) fn split_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        })
    }

    #[test]
    fn test_capture_is_mirrored() {
        let feed = StillFeed::new(Some(split_frame(64, 32)));
        let shot = capture_frame(&feed, 95).unwrap();
        assert_eq!((shot.width, shot.height), (64, 32));

        let decoded = image::load_from_memory(&shot.jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 32));
        let left = decoded.get_pixel(4, 16);
        let right = decoded.get_pixel(60, 16);
        // Red started on the left; after mirroring it is on the right
        assert!(left[2] > 200 && left[0] < 60, "left = {:?}", left);
        assert!(right[0] > 200 && right[2] < 60, "right = {:?}", right);
    }

    #[test]
    fn test_no_frame_yet() {
        let feed = StillFeed::new(None);
        assert!(matches!(capture_frame(&feed, 95), Err(CaptureError::FrameNotReady)));
    }

    #[test]
    fn test_zero_sized_frame() {
        let feed = StillFeed::new(Some(RgbImage::new(0, 0)));
        assert!(matches!(capture_frame(&feed, 95), Err(CaptureError::FrameNotReady)));
    }
}
