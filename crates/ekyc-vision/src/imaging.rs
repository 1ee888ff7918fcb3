//! Raster helpers for the few places the engine touches pixels itself.

use std::io::Cursor;

use ekyc_types::PixelRect;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat, Rgba};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use sha2::{Digest, Sha256};

use crate::error::VisionResult;

pub const JPEG_QUALITY: u8 = 90;
const TEXT_DETECTION_MAX_SIDE: u32 = 1000;
const TEXT_DETECTION_CONTRAST: f32 = 20.0;

pub fn decode(bytes: &[u8]) -> VisionResult<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

pub fn dimensions(bytes: &[u8]) -> VisionResult<(u32, u32)> {
    Ok(decode(bytes)?.dimensions())
}

pub fn encode_png(image: &DynamicImage) -> VisionResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageOutputFormat::Png)?;
    Ok(cursor.into_inner())
}

pub fn encode_jpeg(image: &DynamicImage) -> VisionResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut cursor = Cursor::new(Vec::new());
    rgb.write_to(&mut cursor, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
    Ok(cursor.into_inner())
}

/// Rotates clockwise by `degrees` around the centre, keeping the canvas size
/// and filling uncovered corners with white.
pub fn rotate(image: &DynamicImage, degrees: f32) -> DynamicImage {
    let rgba = image.to_rgba8();
    let rotated = rotate_about_center(
        &rgba,
        degrees.to_radians(),
        Interpolation::Bilinear,
        Rgba([255, 255, 255, 255]),
    );
    DynamicImage::ImageRgba8(rotated)
}

/// Returns `None` for an empty rectangle.
pub fn crop(image: &DynamicImage, rect: PixelRect) -> Option<DynamicImage> {
    if rect.is_empty() {
        return None;
    }
    Some(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

/// Scales to `width` pixels wide, keeping the aspect ratio.
pub fn resize_to_width(image: &DynamicImage, width: u32) -> DynamicImage {
    let (current_width, current_height) = image.dimensions();
    if current_width == width || current_width == 0 || width == 0 {
        return image.clone();
    }
    let height = (u64::from(current_height) * u64::from(width) / u64::from(current_width)).max(1);
    let height = u32::try_from(height).unwrap_or(u32::MAX);
    image.resize_exact(width, height, FilterType::Triangle)
}

/// Grayscale, contrast boost and downscale applied before detecting text on
/// low-contrast cards.
pub fn prepare_for_text_detection(image: &DynamicImage) -> DynamicImage {
    let mut prepared = image.grayscale().adjust_contrast(TEXT_DETECTION_CONTRAST);
    let (width, height) = prepared.dimensions();
    if width > TEXT_DETECTION_MAX_SIDE || height > TEXT_DETECTION_MAX_SIDE {
        prepared = prepared.resize(
            TEXT_DETECTION_MAX_SIDE,
            TEXT_DETECTION_MAX_SIDE,
            FilterType::Triangle,
        );
    }
    prepared
}

/// Content-addressed key for an intermediate image, e.g.
/// `temp/rotated/<sha256>.png`.
pub fn staging_key(prefix: &str, category: &str, bytes: &[u8], extension: &str) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!(
        "{}/{}/{}.{}",
        prefix.trim_end_matches('/'),
        category,
        digest,
        extension
    )
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([20, 40, 60]));
        encode_png(&DynamicImage::ImageRgb8(image)).unwrap()
    }

    #[test]
    fn png_round_trip_keeps_dimensions() {
        let bytes = sample_png(32, 16);
        assert_eq!(dimensions(&bytes).unwrap(), (32, 16));
    }

    #[test]
    fn jpeg_encoding_accepts_rgba_input() {
        let image = decode(&sample_png(8, 8)).unwrap();
        let rotated = rotate(&image, 5.0);
        let jpeg = encode_jpeg(&rotated).unwrap();
        assert_eq!(dimensions(&jpeg).unwrap(), (8, 8));
    }

    #[test]
    fn crop_skips_empty_rectangles() {
        let image = decode(&sample_png(10, 10)).unwrap();
        let empty = PixelRect {
            x: 10,
            y: 0,
            width: 0,
            height: 4,
        };
        assert!(crop(&image, empty).is_none());
        let cropped = crop(
            &image,
            PixelRect {
                x: 2,
                y: 3,
                width: 4,
                height: 5,
            },
        )
        .unwrap();
        assert_eq!(cropped.dimensions(), (4, 5));
    }

    #[test]
    fn large_images_are_downscaled_for_text_detection() {
        let image = decode(&sample_png(2000, 500)).unwrap();
        let prepared = prepare_for_text_detection(&image);
        assert_eq!(prepared.dimensions(), (1000, 250));
    }

    #[test]
    fn resizing_to_width_keeps_aspect_ratio() {
        let image = decode(&sample_png(400, 300)).unwrap();
        assert_eq!(resize_to_width(&image, 1000).dimensions(), (1000, 750));
        assert_eq!(resize_to_width(&image, 400).dimensions(), (400, 300));
    }

    #[test]
    fn staging_keys_are_content_addressed() {
        let a = staging_key("temp/", "rotated", b"one", "png");
        let b = staging_key("temp", "rotated", b"one", "png");
        let c = staging_key("temp", "rotated", b"two", "png");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("temp/rotated/"));
        assert!(a.ends_with(".png"));
    }
}
