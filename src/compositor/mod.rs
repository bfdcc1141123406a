/// Strip compositing
///
/// This module handles:
/// - Loading the template artwork (layout.rs holds the slot geometry)
/// - Cover-fit cropping of each shot into its slot
/// - Rendering the final strip as a lossless PNG
///
/// Compositing is all-or-nothing: every shot is decoded before anything
/// is drawn, so a partial strip is never produced.

pub mod layout;

pub use layout::{PhotoSlot, StripLayout, SHOT_COUNT};

use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capture::CapturedFrame;
use crate::error::CompositeError;

/// The finished four-photo strip, immutable once rendered
#[derive(Clone, PartialEq, Eq)]
pub struct CompositeStrip {
    /// PNG-encoded strip, shared between the printer and the publisher
    pub png: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for CompositeStrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeStrip")
            .field("bytes", &self.png.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Source rectangle to cut out of a shot before scaling it into a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute the centered "cover" crop of a `src_w` x `src_h` image for a slot
///
/// If the source is wider than the slot, its width is cropped symmetrically;
/// if it is taller, its height is. The result has the slot's aspect ratio
/// (up to pixel rounding) and always lies inside the source.
pub fn cover_crop(src_w: u32, src_h: u32, slot: &PhotoSlot) -> CropRect {
    let src_ratio = src_w as f64 / src_h as f64;
    let slot_ratio = slot.width as f64 / slot.height as f64;

    if src_ratio > slot_ratio {
        let width = ((src_h as f64 * slot_ratio).round() as u32).clamp(1, src_w);
        CropRect {
            x: (src_w - width) / 2,
            y: 0,
            width,
            height: src_h,
        }
    } else {
        let height = ((src_w as f64 / slot_ratio).round() as u32).clamp(1, src_h);
        CropRect {
            x: 0,
            y: (src_h - height) / 2,
            width: src_w,
            height,
        }
    }
}

/// Load the template artwork from disk
pub async fn load_template(path: PathBuf) -> Result<RgbaImage, CompositeError> {
    tokio::task::spawn_blocking(move || load_template_blocking(&path))
        .await
        .map_err(|e| CompositeError::Task(e.to_string()))?
}

fn load_template_blocking(path: &Path) -> Result<RgbaImage, CompositeError> {
    let template = image::open(path).map_err(|e| CompositeError::Template {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tracing::debug!(
        "🖼️  Template loaded: {}x{} from {}",
        template.width(),
        template.height(),
        path.display()
    );
    Ok(template.to_rgba8())
}

/// Load the template and render the strip off the async executor
pub async fn composite(
    template_path: PathBuf,
    frames: Vec<CapturedFrame>,
    layout: StripLayout,
) -> Result<CompositeStrip, CompositeError> {
    let template = load_template(template_path).await?;
    tokio::task::spawn_blocking(move || compose_strip(&template, &frames, &layout))
        .await
        .map_err(|e| CompositeError::Task(e.to_string()))?
}

/// Draw every shot into its slot on top of the template
///
/// The output has exactly the template's pixel dimensions.
pub fn compose_strip(
    template: &RgbaImage,
    frames: &[CapturedFrame],
    layout: &StripLayout,
) -> Result<CompositeStrip, CompositeError> {
    let slots = layout.slots();
    if frames.len() != slots.len() {
        return Err(CompositeError::ShotCount {
            expected: slots.len(),
            actual: frames.len(),
        });
    }

    // Output canvas is the template's native size
    let (width, height) = template.dimensions();
    if let Some(index) = slots.iter().position(|s| !s.fits_within(width, height)) {
        return Err(CompositeError::SlotOutOfBounds { index });
    }

    // Decode everything first so one bad shot aborts before any drawing
    let shots = frames
        .iter()
        .enumerate()
        .map(|(index, frame)| decode_shot(index, frame))
        .collect::<Result<Vec<_>, _>>()?;

    // Template is the background, shots are drawn over it
    let mut canvas = template.clone();
    for (shot, slot) in shots.iter().zip(slots) {
        let crop = cover_crop(shot.width(), shot.height(), slot);
        let fitted = shot
            .crop_imm(crop.x, crop.y, crop.width, crop.height)
            // Crop already has the slot's aspect, so this only scales
            .resize_exact(slot.width, slot.height, FilterType::Triangle)
            .to_rgba8();
        imageops::replace(&mut canvas, &fitted, slot.x as i64, slot.y as i64);
    }

    // Lossless output
    let mut png = Cursor::new(Vec::new());
    canvas
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| CompositeError::Encode(e.to_string()))?;

    tracing::info!("🎞️  Strip composited: {}x{}", width, height);

    Ok(CompositeStrip {
        png: png.into_inner().into(),
        width,
        height,
    })
}

fn decode_shot(index: usize, frame: &CapturedFrame) -> Result<DynamicImage, CompositeError> {
    let shot = image::load_from_memory(&frame.jpeg).map_err(|e| CompositeError::ShotDecode {
        index,
        reason: e.to_string(),
    })?;
    if shot.width() == 0 || shot.height() == 0 {
        return Err(CompositeError::ShotDecode {
            index,
            reason: "empty image".to_string(),
        });
    }
    Ok(shot)
}
