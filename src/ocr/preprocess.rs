use image::{DynamicImage, GrayImage, Luma, imageops};

/// Upper bound on the upscaled crop width handed to the OCR engine.
const MAX_OCR_WIDTH: u32 = 6000;

/// Flattens the crop onto white, converts it to luma, upscales it and
/// stretches its contrast to the full range.
pub(crate) fn prepare_crop(crop: &DynamicImage, upscale: u32) -> GrayImage {
    let rgba = crop.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let flatten = |channel: u8| channel as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = 0.299 * flatten(r) + 0.587 * flatten(g) + 0.114 * flatten(b);
        luma.put_pixel(x, y, Luma([value.round() as u8]));
    }

    let scale = effective_scale(width, upscale);
    let resized = if scale > 1 {
        imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    };
    contrast_stretch(resized)
}

fn effective_scale(width: u32, requested: u32) -> u32 {
    let mut scale = requested.max(1);
    while scale > 1 && width.saturating_mul(scale) > MAX_OCR_WIDTH {
        scale -= 1;
    }
    scale
}

fn contrast_stretch(mut image: GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(min, max), pixel| {
            (min.min(pixel[0]), max.max(pixel[0]))
        });
    if max <= min {
        return image;
    }
    let scale = 255.0 / (max - min) as f32;
    for pixel in image.pixels_mut() {
        pixel[0] = ((pixel[0] - min) as f32 * scale).round() as u8;
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn crop_is_upscaled_and_stretched() {
        let mut crop = RgbaImage::from_pixel(4, 2, Rgba([100, 100, 100, 255]));
        crop.put_pixel(0, 0, Rgba([150, 150, 150, 255]));
        let prepared = prepare_crop(&DynamicImage::ImageRgba8(crop), 2);
        assert_eq!(prepared.dimensions(), (8, 4));
        let values: Vec<u8> = prepared.pixels().map(|pixel| pixel[0]).collect();
        assert_eq!(values.iter().copied().min(), Some(0));
        assert_eq!(values.iter().copied().max(), Some(255));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let crop = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        let prepared = prepare_crop(&DynamicImage::ImageRgba8(crop), 1);
        assert!(prepared.pixels().all(|pixel| pixel[0] == 255));
    }

    #[test]
    fn wide_crops_are_not_upscaled_past_the_limit() {
        assert_eq!(effective_scale(100, 3), 3);
        assert_eq!(effective_scale(2500, 3), 2);
        assert_eq!(effective_scale(7000, 3), 1);
        assert_eq!(effective_scale(10, 0), 1);
    }
}
