use iced::widget::image::Handle;
use image::{imageops, DynamicImage, RgbImage};

use crate::compositor::CompositeStrip;

/// Live preview is shown mirrored, the same way the stored shots are
pub fn mirrored_rgba(frame: &RgbImage) -> (u32, u32, Vec<u8>) {
    let mirrored = imageops::flip_horizontal(frame);
    let (width, height) = mirrored.dimensions();
    let rgba = DynamicImage::ImageRgb8(mirrored).into_rgba8();
    (width, height, rgba.into_raw())
}

pub fn frame_handle(frame: &RgbImage) -> Handle {
    let (width, height, pixels) = mirrored_rgba(frame);
    Handle::from_rgba(width, height, pixels)
}

pub fn strip_handle(strip: &CompositeStrip) -> Handle {
    Handle::from_bytes(strip.png.to_vec())
}

/// Fraction of the print animation that has elapsed, clamped to `0..=1`
pub fn print_progress(elapsed: std::time::Duration, total: std::time::Duration) -> f32 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0)
}
