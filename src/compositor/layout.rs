/// Slot geometry of the photo strip template
///
/// The four slots below match the artwork of the bundled template
/// (600 x 1800 px). A kiosk using different artwork can point
/// `PHOTOBOOTH_LAYOUT` at a JSON file with its own rectangles.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Number of shots in one session, one per slot
pub const SHOT_COUNT: usize = 4;

/// A rectangle on the template where one capture is drawn
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoSlot {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PhotoSlot {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the slot fits entirely inside a `width` x `height` canvas
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x.checked_add(self.width).is_some_and(|right| right <= width)
            && self.y.checked_add(self.height).is_some_and(|bottom| bottom <= height)
    }
}

const DEFAULT_SLOTS: [PhotoSlot; SHOT_COUNT] = [
    PhotoSlot::new(40, 120, 520, 360),
    PhotoSlot::new(40, 510, 520, 360),
    PhotoSlot::new(40, 900, 520, 360),
    PhotoSlot::new(40, 1290, 520, 360),
];

/// Ordered slots; slot `i` receives shot `i`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StripLayout {
    slots: Vec<PhotoSlot>,
}

impl Default for StripLayout {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS.to_vec(),
        }
    }
}

impl StripLayout {
    /// Build a layout, checking the slot count and that no slot is empty
    pub fn new(slots: Vec<PhotoSlot>) -> Result<Self, ConfigError> {
        if slots.len() != SHOT_COUNT {
            return Err(ConfigError::SlotCount {
                slots: slots.len(),
                expected: SHOT_COUNT,
            });
        }
        if let Some(index) = slots.iter().position(|s| s.width == 0 || s.height == 0) {
            return Err(ConfigError::EmptySlot { index });
        }
        Ok(Self { slots })
    }

    /// Parse from JSON, e.g. `{"slots":[{"x":0,"y":0,"width":10,"height":10}, ...]}`
    pub fn from_json(json: &str, path: PathBuf) -> Result<Self, ConfigError> {
        let parsed: StripLayout = serde_json::from_str(json)
            .map_err(|source| ConfigError::LayoutParse { path, source })?;
        Self::new(parsed.slots)
    }

    pub fn from_json_file(path: PathBuf) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(&path).map_err(|source| ConfigError::LayoutRead {
            path: path.clone(),
            source,
        })?;
        Self::from_json(&json, path)
    }

    pub fn slots(&self) -> &[PhotoSlot] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_has_one_slot_per_shot() {
        let layout = StripLayout::default();
        assert_eq!(layout.slots().len(), SHOT_COUNT);
        assert!(layout.slots().iter().all(|s| s.fits_within(600, 1800)));
        // Capture order runs top to bottom
        assert!(layout.slots().windows(2).all(|w| w[0].y < w[1].y));
    }

    #[test]
    fn test_from_json_validates_count() {
        let json = r#"{"slots":[{"x":0,"y":0,"width":10,"height":10}]}"#;
        let err = StripLayout::from_json(json, PathBuf::from("layout.json")).unwrap_err();
        assert!(matches!(err, ConfigError::SlotCount { slots: 1, expected: 4 }));
    }

    #[test]
    fn test_from_json_rejects_empty_slot() {
        let json = r#"{"slots":[
            {"x":0,"y":0,"width":10,"height":10},
            {"x":0,"y":10,"width":10,"height":0},
            {"x":0,"y":20,"width":10,"height":10},
            {"x":0,"y":30,"width":10,"height":10}
        ]}"#;
        let err = StripLayout::from_json(json, PathBuf::from("layout.json")).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySlot { index: 1 }));
    }

    #[test]
    fn test_fits_within() {
        let slot = PhotoSlot::new(10, 10, 20, 20);
        assert!(slot.fits_within(30, 30));
        assert!(!slot.fits_within(29, 30));
        assert!(!PhotoSlot::new(u32::MAX, 0, 1, 1).fits_within(u32::MAX, 1));
    }
}
