//! Final export: white boxes over each region with its text wrapped and
//! centered inside, rasterized at the working image's resolution.

mod font;
mod layout;
mod svg;

use anyhow::Result;
use image::RgbaImage;
use std::path::Path;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

use crate::compositor::{self, JPEG_QUALITY};
use crate::region::TextRegion;
use crate::settings::Settings;

pub use font::{FontMetrics, ResolvedFont, measure_text_width_px, resolve_export_font};
pub use layout::{TextBlock, TextLine, font_size_for, layout_region, wrap_words};
pub use svg::{PlacedText, SvgPaint, build_export_svg, rasterize_svg};

const DEFAULT_FAMILY: &str = "sans-serif";

#[derive(Debug, Clone)]
pub struct ExportStyle {
    pub fill_color: String,
    pub text_color: String,
    pub quality: u8,
    pub font: Option<ResolvedFont>,
}

impl Default for ExportStyle {
    fn default() -> Self {
        Self {
            fill_color: "#ffffff".to_string(),
            text_color: "#000000".to_string(),
            quality: JPEG_QUALITY,
            font: None,
        }
    }
}

impl ExportStyle {
    /// Builds the style from settings. A font that cannot be resolved is
    /// logged and replaced by estimated metrics with the generic family.
    pub fn from_settings(settings: &Settings) -> Self {
        let font = match resolve_export_font(
            settings.export_font_path.as_deref().map(Path::new),
            settings.export_font_family.as_deref(),
        ) {
            Ok(font) => {
                debug!(family = %font.family, "export font resolved");
                Some(font)
            }
            Err(err) => {
                warn!("export font unavailable, using estimated metrics: {:#}", err);
                None
            }
        };
        Self {
            fill_color: settings.export_fill_color.clone(),
            text_color: settings.export_text_color.clone(),
            quality: settings.export_quality,
            font,
        }
    }

    fn metrics(&self) -> Option<&FontMetrics> {
        self.font.as_ref().map(|font| &font.metrics)
    }

    fn family(&self) -> &str {
        self.font
            .as_ref()
            .map(|font| font.family.as_str())
            .unwrap_or(DEFAULT_FAMILY)
    }
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn export_filename(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]Z");
    let stamp = at
        .to_offset(time::UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("webtoon-translated-{}.jpg", stamp)
}

/// Lays out every region that has text to show, in slice order. Regions with
/// neither a translation nor recognized text are skipped.
pub fn place_regions(
    width: u32,
    height: u32,
    regions: &[TextRegion],
    font: Option<&FontMetrics>,
) -> Vec<PlacedText> {
    regions
        .iter()
        .filter_map(|region| {
            let text = region.display_text()?;
            let rect = region.rect.to_pixels(width, height);
            Some(PlacedText {
                rect,
                block: layout_region(&rect, text, font),
            })
        })
        .collect()
}

pub fn render_export(
    working: &RgbaImage,
    regions: &[TextRegion],
    style: &ExportStyle,
) -> Result<RgbaImage> {
    let (width, height) = working.dimensions();
    let placements = place_regions(width, height, regions, style.metrics());
    debug!(
        regions = regions.len(),
        painted = placements.len(),
        "rendering export"
    );
    let paint = SvgPaint {
        fill_color: &style.fill_color,
        text_color: &style.text_color,
        font_family: style.family(),
    };
    let svg = build_export_svg(working, &placements, &paint)?;
    rasterize_svg(&svg, style.metrics().map(FontMetrics::data))
}

/// Renders the export and encodes it as a timestamped JPEG.
pub fn export_jpeg(
    working: &RgbaImage,
    regions: &[TextRegion],
    style: &ExportStyle,
    at: OffsetDateTime,
) -> Result<ExportArtifact> {
    let rendered = render_export(working, regions, style)?;
    let bytes = compositor::encode_jpeg(&rendered, style.quality)?;
    Ok(ExportArtifact {
        filename: export_filename(at),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{PercentRect, RegionId};
    use image::Rgba;
    use time::macros::datetime;

    fn region(id: u64, rect: PercentRect, original: &str, translated: &str) -> TextRegion {
        TextRegion {
            id: RegionId(id),
            rect,
            original_text: original.to_string(),
            translated_text: translated.to_string(),
            order: id as u32,
        }
    }

    #[test]
    fn filename_uses_utc_timestamp() {
        let at = datetime!(2024-03-09 23:30:05 -02:00);
        assert_eq!(
            export_filename(at),
            "webtoon-translated-2024-03-10T01-30-05Z.jpg"
        );
    }

    #[test]
    fn only_regions_with_text_are_placed() {
        let regions = vec![
            region(1, PercentRect::new(0.0, 0.0, 50.0, 50.0), "", ""),
            region(2, PercentRect::new(50.0, 50.0, 50.0, 50.0), "원문", "  "),
            region(3, PercentRect::new(10.0, 10.0, 20.0, 10.0), "x", "Hello"),
        ];
        let placed = place_regions(200, 100, &regions, None);
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].block.lines[0].text, "원문");
        assert_eq!(placed[1].block.lines[0].text, "Hello");
        assert_eq!(placed[1].rect.x, 20.0);
        assert_eq!(placed[1].rect.width, 40.0);
    }

    #[test]
    fn export_whites_out_text_regions_only() {
        let working = RgbaImage::from_pixel(200, 200, Rgba([30, 60, 90, 255]));
        let regions = vec![
            region(1, PercentRect::new(0.0, 0.0, 50.0, 50.0), "", ""),
            region(2, PercentRect::new(50.0, 50.0, 50.0, 50.0), "", "Hi"),
        ];
        let rendered = render_export(&working, &regions, &ExportStyle::default()).unwrap();
        assert_eq!(rendered.dimensions(), (200, 200));
        assert_eq!(rendered.get_pixel(10, 10).0, [30, 60, 90, 255]);
        assert_eq!(rendered.get_pixel(102, 102).0, [255, 255, 255, 255]);
        assert_eq!(rendered.get_pixel(197, 197).0, [255, 255, 255, 255]);
        assert_eq!(rendered.get_pixel(60, 150).0, [30, 60, 90, 255]);
    }

    #[test]
    fn export_artifact_is_a_jpeg_of_the_same_size() {
        let working = RgbaImage::from_pixel(64, 32, Rgba([255, 255, 255, 255]));
        let at = datetime!(2024-01-01 00:00:00 UTC);
        let artifact = export_jpeg(&working, &[], &ExportStyle::default(), at).unwrap();
        assert_eq!(artifact.filename, "webtoon-translated-2024-01-01T00-00-00Z.jpg");
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }
}
