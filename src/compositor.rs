use anyhow::{Context, Result, anyhow};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage, imageops};
use tracing::debug;

pub const JPEG_QUALITY: u8 = 95;

const CANVAS_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// One uploaded page, decoded at its native size.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: String,
    pub image: DynamicImage,
}

impl SourceImage {
    pub fn decode(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        let image = image::load_from_memory(bytes)
            .with_context(|| format!("failed to decode image: {}", name))?;
        Ok(Self { name, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decodes every file in order; the first failure aborts the whole batch.
pub fn decode_all(files: Vec<(String, Vec<u8>)>) -> Result<Vec<SourceImage>> {
    files
        .into_iter()
        .map(|(name, bytes)| SourceImage::decode(name, &bytes))
        .collect()
}

/// The stitched composite that regions are drawn against.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    pub image: RgbaImage,
    pub jpeg: Vec<u8>,
}

impl WorkingImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Width is the widest source, height is the sum of all heights.
pub fn canvas_size(sources: &[SourceImage]) -> Result<(u32, u32)> {
    let width = sources.iter().map(SourceImage::width).max().unwrap_or(0);
    let height = sources.iter().try_fold(0u32, |total, source| {
        total
            .checked_add(source.height())
            .ok_or_else(|| anyhow!("merged image is too tall"))
    })?;
    Ok((width, height))
}

/// Stacks the sources top to bottom, left-aligned on a white canvas.
/// Returns `None` for an empty list.
pub fn merge_images(sources: &[SourceImage]) -> Result<Option<WorkingImage>> {
    if sources.is_empty() {
        return Ok(None);
    }
    let (width, height) = canvas_size(sources)?;
    if width == 0 || height == 0 {
        return Err(anyhow!("merged image would be empty ({}x{})", width, height));
    }

    let mut canvas = RgbaImage::from_pixel(width, height, CANVAS_BACKGROUND);
    let mut offset_y = 0i64;
    for source in sources {
        imageops::overlay(&mut canvas, &source.image.to_rgba8(), 0, offset_y);
        offset_y += i64::from(source.height());
    }
    debug!(width, height, pages = sources.len(), "merged working image");

    let jpeg = encode_jpeg(&canvas, JPEG_QUALITY)?;
    Ok(Some(WorkingImage {
        image: canvas,
        jpeg,
    }))
}

pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .with_context(|| "failed to encode JPEG")?;
    Ok(bytes)
}

#[cfg(test)]
pub(crate) fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
