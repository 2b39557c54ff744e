use std::io::Cursor;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};

use crate::batch::types::AspectRatio;
use crate::llm::GenerationError;

/// Exact output pixel dimensions per aspect ratio. The model does not always
/// honor the requested ratio precisely, so every result is normalized to
/// this table before it leaves the client.
pub fn target_dimensions(ratio: AspectRatio) -> (u32, u32) {
    match ratio {
        AspectRatio::Square => (2048, 2048),
        AspectRatio::Landscape => (2048, 1152),
        AspectRatio::Portrait => (1152, 2048),
        AspectRatio::SocialPortrait => (1600, 2000),
        AspectRatio::Banner => (3072, 1024),
        AspectRatio::WideBanner => (4096, 1024),
    }
}

/// Cover-fit normalization: scale to fill the target box, center-crop the
/// overflow, re-encode as PNG. Guarantees consistent output dimensions
/// regardless of what the model actually returned.
pub fn normalize_to_ratio(bytes: &[u8], ratio: AspectRatio) -> Result<Vec<u8>, GenerationError> {
    let (target_width, target_height) = target_dimensions(ratio);
    let img = image::load_from_memory(bytes)
        .map_err(|err| GenerationError::Upstream(format!("Unreadable model output: {err}")))?;

    let filled = cover_fit(&img, target_width, target_height);

    let mut out = Vec::new();
    filled
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|err| GenerationError::Upstream(format!("Failed to encode output: {err}")))?;
    Ok(out)
}

fn cover_fit(img: &DynamicImage, target_width: u32, target_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width == target_width && height == target_height {
        return img.clone();
    }

    // Scale so both axes cover the target, then crop the centered overflow.
    let scale = f64::max(
        target_width as f64 / width as f64,
        target_height as f64 / height as f64,
    );
    let scaled_width = (width as f64 * scale).ceil() as u32;
    let scaled_height = (height as f64 * scale).ceil() as u32;

    let scaled = img.resize_exact(scaled_width, scaled_height, FilterType::Lanczos3);
    let x = (scaled_width - target_width) / 2;
    let y = (scaled_height - target_height) / 2;
    scaled.crop_imm(x, y, target_width, target_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            image::Rgb([120, 90, 60]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn pixel_table_matches_documented_dimensions() {
        assert_eq!(target_dimensions(AspectRatio::Square), (2048, 2048));
        assert_eq!(target_dimensions(AspectRatio::Landscape), (2048, 1152));
        assert_eq!(target_dimensions(AspectRatio::Portrait), (1152, 2048));
        assert_eq!(target_dimensions(AspectRatio::SocialPortrait), (1600, 2000));
        assert_eq!(target_dimensions(AspectRatio::Banner), (3072, 1024));
        assert_eq!(target_dimensions(AspectRatio::WideBanner), (4096, 1024));
    }

    #[test]
    fn normalization_yields_exact_target_dimensions_for_every_ratio() {
        let source = png_of(640, 480);
        for ratio in [
            AspectRatio::Square,
            AspectRatio::Landscape,
            AspectRatio::Portrait,
            AspectRatio::SocialPortrait,
            AspectRatio::Banner,
            AspectRatio::WideBanner,
        ] {
            let normalized = normalize_to_ratio(&source, ratio).unwrap();
            let img = image::load_from_memory(&normalized).unwrap();
            assert_eq!(img.dimensions(), target_dimensions(ratio));
        }
    }

    #[test]
    fn mismatched_input_is_center_cropped_not_letterboxed() {
        // A tall source into a wide target must fill the frame completely.
        let source = png_of(200, 800);
        let normalized = normalize_to_ratio(&source, AspectRatio::Landscape).unwrap();
        let img = image::load_from_memory(&normalized).unwrap();
        assert_eq!(img.dimensions(), (2048, 1152));
    }

    #[test]
    fn garbage_bytes_are_an_upstream_error() {
        let result = normalize_to_ratio(b"not an image", AspectRatio::Square);
        assert!(result.is_err());
    }
}
