use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use super::layout::TextBlock;
use crate::region::PixelRect;

/// One whited-out box and the text laid out inside it.
#[derive(Debug, Clone)]
pub struct PlacedText {
    pub rect: PixelRect,
    pub block: TextBlock,
}

#[derive(Debug, Clone)]
pub struct SvgPaint<'a> {
    pub fill_color: &'a str,
    pub text_color: &'a str,
    pub font_family: &'a str,
}

/// Builds an SVG document that draws `base` at its native size and paints
/// each placement on top of it, in slice order.
pub fn build_export_svg(
    base: &RgbaImage,
    placements: &[PlacedText],
    paint: &SvgPaint<'_>,
) -> Result<String> {
    let (width, height) = base.dimensions();
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(base.clone())
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .with_context(|| "failed to encode working image for export")?;
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(&png));

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));

    let fill = escape_xml(paint.fill_color);
    let color = escape_xml(paint.text_color);
    let family = escape_xml(paint.font_family);
    for placed in placements {
        let PixelRect {
            x,
            y,
            width: w,
            height: h,
        } = placed.rect;
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}"/>"#
        ));
        for line in &placed.block.lines {
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-size="{size}" font-weight="bold" font-family="{family}" fill="{color}" text-anchor="middle" dominant-baseline="text-before-edge">{text}</text>"#,
                x = line.x,
                y = line.y,
                size = placed.block.font_size,
                text = escape_xml(&line.text)
            ));
        }
    }

    svg.push_str("</svg>");
    Ok(svg)
}

/// Rasterizes an SVG produced by [`build_export_svg`]. `font_data` is added to
/// the system font database so a font loaded from a file path is usable.
pub fn rasterize_svg(svg: &str, font_data: Option<&[u8]>) -> Result<RgbaImage> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    if let Some(data) = font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
    RgbaImage::from_raw(size.width(), size.height(), pixmap.take())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::layout::TextLine;
    use image::Rgba;

    fn placed(text: &str) -> PlacedText {
        PlacedText {
            rect: PixelRect {
                x: 2.0,
                y: 4.0,
                width: 10.0,
                height: 6.0,
            },
            block: TextBlock {
                font_size: 12.0,
                line_height: 14.4,
                lines: vec![TextLine {
                    text: text.to_string(),
                    x: 7.0,
                    y: -0.2,
                }],
            },
        }
    }

    fn paint() -> SvgPaint<'static> {
        SvgPaint {
            fill_color: "#ffffff",
            text_color: "#000000",
            font_family: "sans-serif",
        }
    }

    #[test]
    fn text_is_escaped_and_centered() {
        let base = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let svg = build_export_svg(&base, &[placed("Tom & <Jerry>")], &paint()).unwrap();
        assert!(svg.contains(r##"<rect x="2" y="4" width="10" height="6" fill="#ffffff"/>"##));
        assert!(svg.contains("Tom &amp; &lt;Jerry&gt;"));
        assert!(svg.contains(r#"text-anchor="middle" dominant-baseline="text-before-edge""#));
        assert!(svg.contains(r#"font-weight="bold""#));
    }

    #[test]
    fn rasterized_svg_keeps_size_and_base_pixels() {
        let base = RgbaImage::from_pixel(20, 12, Rgba([200, 10, 10, 255]));
        let svg = build_export_svg(&base, &[placed("")], &paint()).unwrap();
        let raster = rasterize_svg(&svg, None).unwrap();
        assert_eq!(raster.dimensions(), (20, 12));
        assert_eq!(raster.get_pixel(0, 0).0, [200, 10, 10, 255]);
        assert_eq!(raster.get_pixel(5, 6).0, [255, 255, 255, 255]);
    }
}
