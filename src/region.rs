use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest width and height (in percentage points) a drawn rectangle needs
/// to be kept as a region.
pub const MIN_REGION_SIZE: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentPoint {
    pub x: f32,
    pub y: f32,
}

impl PercentPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub(crate) fn clamped(self) -> Self {
        Self {
            x: clamp_percent(self.x),
            y: clamp_percent(self.y),
        }
    }
}

/// Rectangle expressed as percentages of the image it was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PercentRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PercentRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn at(point: PercentPoint) -> Self {
        Self::new(point.x, point.y, 0.0, 0.0)
    }

    pub fn from_corners(a: PercentPoint, b: PercentPoint) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    /// Inclusive on every edge.
    pub fn contains(&self, point: PercentPoint) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn exceeds_min_size(&self) -> bool {
        self.width > MIN_REGION_SIZE && self.height > MIN_REGION_SIZE
    }

    /// Pulls the origin into [0,100] and shrinks the extent so the rectangle
    /// never crosses the image edge.
    pub fn clamped(self) -> Self {
        let x = clamp_percent(self.x);
        let y = clamp_percent(self.y);
        Self {
            x,
            y,
            width: self.width.max(0.0).min(100.0 - x),
            height: self.height.max(0.0).min(100.0 - y),
        }
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let w = width as f32;
        let h = height as f32;
        PixelRect {
            x: self.x * w / 100.0,
            y: self.y * h / 100.0,
            width: self.width * w / 100.0,
            height: self.height * h / 100.0,
        }
    }

    pub fn from_pixels(rect: &PixelRect, width: u32, height: u32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self {
            x: rect.x * 100.0 / w,
            y: rect.y * 100.0 / h,
            width: rect.width * 100.0 / w,
            height: rect.height * 100.0 / h,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    pub fn center_x(&self) -> f32 {
        self.x + self.width * 0.5
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height * 0.5
    }

    /// Integer crop window inside a `width` x `height` raster, or `None` when
    /// nothing of the rectangle lands on the raster.
    pub fn crop_window(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.floor().max(0.0) as u32;
        let y0 = self.y.floor().max(0.0) as u32;
        let x1 = ((self.x + self.width).ceil().max(0.0) as u32).min(width);
        let y1 = ((self.y + self.height).ceil().max(0.0) as u32).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRegion {
    pub id: RegionId,
    #[serde(flatten)]
    pub rect: PercentRect,
    pub original_text: String,
    pub translated_text: String,
    pub order: u32,
}

impl TextRegion {
    /// Translation when present, otherwise the recognized text; `None` when
    /// neither has any content.
    pub fn display_text(&self) -> Option<&str> {
        let translated = self.translated_text.trim();
        if !translated.is_empty() {
            return Some(translated);
        }
        let original = self.original_text.trim();
        if original.is_empty() {
            None
        } else {
            Some(original)
        }
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(translated: &str, original: &str) -> TextRegion {
        TextRegion {
            id: RegionId(1),
            rect: PercentRect::new(0.0, 0.0, 10.0, 10.0),
            original_text: original.to_string(),
            translated_text: translated.to_string(),
            order: 1,
        }
    }

    #[test]
    fn corners_in_any_direction_give_same_box() {
        let a = PercentPoint::new(30.0, 20.0);
        let b = PercentPoint::new(10.0, 10.0);
        let expected = PercentRect::new(10.0, 10.0, 20.0, 10.0);
        assert_eq!(PercentRect::from_corners(a, b), expected);
        assert_eq!(PercentRect::from_corners(b, a), expected);
        assert_eq!(
            PercentRect::from_corners(PercentPoint::new(10.0, 20.0), PercentPoint::new(30.0, 10.0)),
            expected
        );
    }

    #[test]
    fn contains_is_inclusive_on_edges() {
        let rect = PercentRect::new(10.0, 10.0, 20.0, 10.0);
        assert!(rect.contains(PercentPoint::new(10.0, 10.0)));
        assert!(rect.contains(PercentPoint::new(30.0, 20.0)));
        assert!(!rect.contains(PercentPoint::new(30.1, 15.0)));
        assert!(!rect.contains(PercentPoint::new(15.0, 9.9)));
    }

    #[test]
    fn min_size_needs_both_axes() {
        assert!(!PercentRect::new(0.0, 0.0, 0.05, 10.0).exceeds_min_size());
        assert!(!PercentRect::new(0.0, 0.0, 10.0, 0.05).exceeds_min_size());
        assert!(PercentRect::new(0.0, 0.0, 0.06, 0.06).exceeds_min_size());
    }

    #[test]
    fn pixel_round_trip_keeps_percentages() {
        let rect = PercentRect::new(12.5, 33.3, 41.7, 7.25);
        for (w, h) in [(600, 1400), (1, 1), (3333, 77), (800, 12000)] {
            let back = PercentRect::from_pixels(&rect.to_pixels(w, h), w, h);
            assert!((back.x - rect.x).abs() < 1e-3);
            assert!((back.y - rect.y).abs() < 1e-3);
            assert!((back.width - rect.width).abs() < 1e-3);
            assert!((back.height - rect.height).abs() < 1e-3);
        }
    }

    #[test]
    fn clamped_stays_inside_image() {
        let rect = PercentRect::new(90.0, -5.0, 20.0, 30.0).clamped();
        assert_eq!(rect, PercentRect::new(90.0, 0.0, 10.0, 30.0));
    }

    #[test]
    fn crop_window_is_clipped_to_raster() {
        let px = PixelRect {
            x: 590.5,
            y: -3.0,
            width: 20.0,
            height: 10.2,
        };
        assert_eq!(px.crop_window(600, 1400), Some((590, 0, 10, 8)));
        let outside = PixelRect {
            x: 700.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        };
        assert_eq!(outside.crop_window(600, 1400), None);
    }

    #[test]
    fn display_text_prefers_translation() {
        assert_eq!(region("Hello", "안녕").display_text(), Some("Hello"));
        assert_eq!(region("  ", "안녕").display_text(), Some("안녕"));
        assert_eq!(region("", " ").display_text(), None);
    }

    #[test]
    fn region_serializes_flat_camel_case() {
        let value = serde_json::to_value(region("Hi", "")).unwrap();
        assert_eq!(value["translatedText"], "Hi");
        assert_eq!(value["width"], 10.0);
        assert_eq!(value["id"], 1);
    }
}
