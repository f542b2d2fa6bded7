mod preprocess;
mod tesseract;

use anyhow::Result;
use image::{DynamicImage, RgbaImage, imageops};
use std::future::Future;
use std::pin::Pin;

use crate::region::{PercentRect, RegionId};
use crate::sequencing::RegionSet;

pub use tesseract::{TesseractEngine, check_language_installed, list_tesseract_languages};

pub type OcrFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Text recognition for a single cropped region.
pub trait OcrEngine: Send + Sync {
    /// `language` is a language code as accepted by [`crate::languages`].
    fn recognize<'a>(&'a self, crop: &'a DynamicImage, language: &'a str) -> OcrFuture<'a>;
}

/// A region's pixels at native resolution, cut out ahead of an OCR pass.
/// `image` is `None` when the region covers no pixels of the image.
#[derive(Debug, Clone)]
pub struct RegionCrop {
    pub id: RegionId,
    pub order: u32,
    pub image: Option<DynamicImage>,
}

pub fn crop_region(image: &RgbaImage, rect: &PercentRect) -> Option<DynamicImage> {
    let (width, height) = image.dimensions();
    let (x, y, w, h) = rect.to_pixels(width, height).crop_window(width, height)?;
    let cropped = imageops::crop_imm(image, x, y, w, h).to_image();
    Some(DynamicImage::ImageRgba8(cropped))
}

/// Crops every region in ascending `order`.
pub fn collect_crops(image: &RgbaImage, regions: &RegionSet) -> Vec<RegionCrop> {
    regions
        .sorted_by_order()
        .into_iter()
        .map(|region| RegionCrop {
            id: region.id,
            order: region.order,
            image: crop_region(image, &region.rect),
        })
        .collect()
}

/// Recognizes one crop; an empty crop yields empty text without calling the
/// engine.
pub async fn recognize_crop(
    engine: &dyn OcrEngine,
    crop: &RegionCrop,
    language: &str,
) -> Result<String> {
    match crop.image.as_ref() {
        Some(image) => Ok(engine.recognize(image, language).await?.trim().to_string()),
        None => Ok(String::new()),
    }
}
